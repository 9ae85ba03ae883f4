//! bookcat-server library - book catalog HTTP service
//!
//! JSON API over the catalog database plus the built frontend, cover
//! uploads and user assets served from disk.

use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use bookcat_common::config::{RootLayout, DEFAULT_SESSION_IDLE_MINUTES};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod csv_import;
pub mod db;
pub mod error;
pub mod fields;
pub mod imaging;
pub mod pagination;
pub mod thumbs;
pub mod uploads;

/// Request body limit; covers are capped lower by their handler
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Root folder layout (uploads, user assets)
    pub layout: RootLayout,
    /// Built frontend (`index.html`, `assets/`)
    pub dist_dir: PathBuf,
    /// Configured server-side export directory, inspected per request
    pub backup_dir: Option<String>,
    /// Minutes of inactivity before a session lapses
    pub session_idle_minutes: u64,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, layout: RootLayout, dist_dir: PathBuf, backup_dir: Option<String>) -> Self {
        Self {
            db,
            layout,
            dist_dir,
            backup_dir,
            session_idle_minutes: DEFAULT_SESSION_IDLE_MINUTES,
        }
    }

    pub fn with_session_idle_minutes(mut self, minutes: u64) -> Self {
        self.session_idle_minutes = minutes.max(1);
        self
    }
}

/// Build application router
///
/// Every request passes the session middleware; the admin and login route
/// groups then reject requests without the needed session.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post, put};

    // Admin routes
    let admin = Router::new()
        .route("/api/books", post(api::create_book))
        .route("/api/books/:id", put(api::update_book).delete(api::delete_book))
        .route("/api/authors", get(api::list_authors).post(api::create_author))
        .route("/api/authors/:id", put(api::update_author).delete(api::delete_author))
        .route("/api/covers", post(api::upload_cover))
        .route("/api/covers/:book_id", axum::routing::delete(api::delete_cover))
        .route("/api/maintenance/rebuild_thumbs", post(api::rebuild_thumbs))
        .route("/api/maintenance/normalize_covers", post(api::normalize_covers))
        .route("/api/import/csv", post(api::import_csv))
        .route("/api/export/covers.zip", get(api::export_covers_zip))
        .route("/api/backup", get(api::full_backup))
        .route("/api/duplicates", get(api::list_duplicates))
        .route("/api/duplicates/export.csv", get(api::export_duplicates_csv))
        .route("/api/duplicates/review", post(api::review_duplicate))
        .route("/api/orphans", get(api::list_orphans).post(api::orphan_action))
        .route("/api/admin/warnings", get(api::admin_warnings))
        .route("/api/users", get(api::list_users).post(api::create_user))
        .route(
            "/api/users/:id",
            axum::routing::patch(api::update_user).delete(api::delete_user),
        )
        .route("/api/users/:id/reset_password", post(api::reset_password))
        .route("/api/auth_events", get(api::list_auth_events))
        .route("/api/auth_events/purge", post(api::purge_auth_events))
        .layer(middleware::from_fn(api::require_admin));

    // Routes for any logged-in user
    let logged_in = Router::new()
        .route("/api/me", get(api::me))
        .route("/api/change_password", post(api::change_password))
        .route("/api/preferences", get(api::get_preferences).post(api::update_preferences))
        .route("/api/books", get(api::list_books))
        .route("/api/books/:id", get(api::get_book))
        .route("/api/export/books.csv", get(api::export_books_csv))
        .route("/api/export/books.json", get(api::export_books_json))
        .layer(middleware::from_fn(api::require_login));

    // Public routes (no session needed)
    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/api/login", post(api::login))
        .route("/api/logout", post(api::logout))
        .route("/api/status", get(api::runtime_status))
        .route("/api/authors/search", get(api::search_authors))
        .route("/api/publishers/search", get(api::search_publishers))
        .route("/api/publishers/suggest", get(api::suggest_publishers))
        .merge(api::static_routes(&state))
        .merge(api::health_routes());

    Router::new()
        .merge(admin)
        .merge(logged_in)
        .merge(public)
        .layer(middleware::from_fn_with_state(state.clone(), api::session_middleware))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
