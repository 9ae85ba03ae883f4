//! bookcat - book catalog server and maintenance commands
//!
//! `bookcat serve` (the default) runs the HTTP service; `init-admin` and
//! `generate-thumbs` work directly on the root folder.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bookcat_common::config::{
    resolve_root_folder, resolve_session_idle_minutes, resolve_setting, FileConfig, RootLayout,
    BACKUP_DIR_ENV_VAR,
};
use bookcat_common::db::{init_database, sync_system_info};
use bookcat_common::password::{hash_password, policy_errors};
use bookcat_server::db::{preferences, users};
use bookcat_server::thumbs::{self, GenerateOptions};
use bookcat_server::{build_router, AppState};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_BIND: &str = "127.0.0.1:5780";

/// Command-line arguments for bookcat
#[derive(Parser, Debug)]
#[command(name = "bookcat")]
#[command(about = "Book catalog server")]
#[command(version)]
struct Cli {
    /// Root folder holding bookcat.db, uploads/ and user-assets/
    #[arg(long, global = true)]
    root: Option<String>,

    /// Config file (default: platform config dir, then /etc/bookcat)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Listen address
        #[arg(long)]
        bind: Option<String>,

        /// Built frontend directory (default: <root>/dist)
        #[arg(long)]
        dist: Option<String>,

        /// Minutes of inactivity before a login session lapses
        #[arg(long)]
        session_idle_minutes: Option<u64>,
    },
    /// Create the initial admin account
    InitAdmin {
        #[arg(long)]
        username: String,

        #[arg(long, env = "BOOKCAT_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Regenerate cover thumbnails for the newest books
    GenerateThumbs {
        /// Thumbnail height in pixels
        #[arg(long, default_value_t = 240)]
        height: u32,

        /// Rebuild thumbnails that already exist
        #[arg(long)]
        force: bool,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Newest books to scan
        #[arg(long, default_value_t = 100_000)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Build identification comes first, before any database work
    info!(
        "Starting bookcat v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();
    let file_config = FileConfig::load(cli.config.as_deref()).context("Failed to load config file")?;
    let root = resolve_root_folder(cli.root.as_deref(), &file_config);
    let layout = RootLayout::new(root);
    info!("Root folder: {}", layout.root().display());

    let default_command = Command::Serve {
        bind: None,
        dist: None,
        session_idle_minutes: None,
    };
    match cli.command.unwrap_or(default_command) {
        Command::Serve {
            bind,
            dist,
            session_idle_minutes,
        } => serve(layout, &file_config, bind, dist, session_idle_minutes).await,
        Command::InitAdmin { username, password } => init_admin(&layout, &username, &password).await,
        Command::GenerateThumbs {
            height,
            force,
            dry_run,
            limit,
        } => {
            let opts = GenerateOptions {
                height: height.clamp(40, 4000),
                force,
                dry_run,
                limit: limit.max(1),
            };
            generate(&layout, opts).await
        }
    }
}

async fn open_database(layout: &RootLayout) -> Result<SqlitePool> {
    layout.ensure_directories()?;
    let db_path = layout.database_path();
    info!("Database path: {}", db_path.display());
    let pool = match init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };
    sync_system_info(&pool, env!("CARGO_PKG_VERSION")).await;
    Ok(pool)
}

async fn serve(
    layout: RootLayout,
    file_config: &FileConfig,
    bind: Option<String>,
    dist: Option<String>,
    session_idle_minutes: Option<u64>,
) -> Result<()> {
    let pool = open_database(&layout).await?;

    let bind = resolve_setting(bind.as_deref(), "BOOKCAT_BIND", file_config.bind.as_deref(), DEFAULT_BIND);
    let default_dist = layout.root().join("dist");
    let dist_dir = PathBuf::from(resolve_setting(
        dist.as_deref(),
        "BOOKCAT_DIST",
        file_config.dist_dir.as_deref(),
        &default_dist.to_string_lossy(),
    ));
    if !dist_dir.join("index.html").is_file() {
        warn!("Frontend not found at {}", dist_dir.display());
    }

    let backup_dir = std::env::var(BACKUP_DIR_ENV_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| file_config.backup_dir.clone());
    match &backup_dir {
        Some(dir) => info!("Server-side exports: {}", dir),
        None => info!("Exports stream to the client ({} not set)", BACKUP_DIR_ENV_VAR),
    }

    let idle_minutes = resolve_session_idle_minutes(session_idle_minutes, file_config);
    info!("Sessions lapse after {} idle minutes", idle_minutes);

    let state = AppState::new(pool, layout, dist_dir, backup_dir).with_session_idle_minutes(idle_minutes);
    let app = build_router(state);

    let addr: SocketAddr = bind.parse().with_context(|| format!("Invalid bind address '{}'", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("bookcat listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn init_admin(layout: &RootLayout, username: &str, password: &str) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        bail!("Username is required");
    }
    let problems = policy_errors(password, username);
    if !problems.is_empty() {
        bail!("Password does not meet policy:\n  {}", problems.join("\n  "));
    }

    let pool = open_database(layout).await?;
    if users::username_exists(&pool, username).await? {
        bail!("User '{}' already exists", username);
    }

    let hash = hash_password(password)?;
    let user_id = users::create_user(&pool, username, &hash, users::ROLE_ADMIN).await?;
    preferences::ensure_preferences_row(&pool, user_id).await?;
    info!("Created admin '{}' (user_id {})", username, user_id);
    Ok(())
}

async fn generate(layout: &RootLayout, opts: GenerateOptions) -> Result<()> {
    let pool = open_database(layout).await?;
    let root: &Path = layout.root();
    let summary = thumbs::generate_thumbs(&pool, root, opts).await?;
    println!(
        "Scanned {}, generated {}, skipped {}, errors {}",
        summary.scanned, summary.generated, summary.skipped, summary.errors
    );
    if summary.errors > 0 {
        bail!("{} thumbnails failed", summary.errors);
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
