//! Database initialization
//!
//! Creates the catalog schema on first run and keeps `SystemInfo` in step
//! with the running binary:
//! - Automatic database creation with default schema
//! - Idempotent table creation on every startup
//! - SystemInfo app/schema version sync (never blocks startup)

use crate::{Result, SCHEMA_VERSION};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Foreign keys are a per-connection setting, so they go on the connect
    // options rather than a one-off PRAGMA
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    if newly_created {
        record_install_date(&pool).await?;
    }

    Ok(pool)
}

/// Create every catalog table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_publishers_table(pool).await?;
    create_subjects_table(pool).await?;
    create_placement_table(pool).await?;
    create_authors_table(pool).await?;
    create_books_table(pool).await?;

    // Linking tables
    create_books_authors_table(pool).await?;
    create_books_subjects_table(pool).await?;

    // Accounts and auditing
    create_users_table(pool).await?;
    create_user_preferences_table(pool).await?;
    create_sessions_table(pool).await?;
    create_auth_events_table(pool).await?;

    create_system_info_table(pool).await?;
    create_duplicate_review_table(pool).await?;

    Ok(())
}

async fn create_publishers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Publishers (
            publisher_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_subjects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Subjects (
            subject_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_placement_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Placement (
            placement_id INTEGER PRIMARY KEY AUTOINCREMENT,
            bookcase_no INTEGER NOT NULL,
            shelf_no INTEGER NOT NULL,
            UNIQUE (bookcase_no, shelf_no)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_authors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Authors (
            author_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT COLLATE NOCASE,
            first_name TEXT COLLATE NOCASE,
            last_name TEXT COLLATE NOCASE,
            sort_name TEXT COLLATE NOCASE,
            is_hungarian INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_authors_sort_name ON Authors(sort_name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_authors_name ON Authors(name)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_books_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Books (
            book_id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL COLLATE NOCASE,
            subtitle TEXT COLLATE NOCASE,
            series TEXT COLLATE NOCASE,
            publisher_id INTEGER REFERENCES Publishers(publisher_id) ON DELETE SET NULL,
            year_published INTEGER,
            isbn TEXT,
            lccn TEXT,
            notes TEXT COLLATE NOCASE,
            cover_image TEXT,
            cover_thumb TEXT,
            loaned_to TEXT COLLATE NOCASE,
            loaned_date TEXT,
            placement_id INTEGER REFERENCES Placement(placement_id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_title ON Books(title)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_publisher ON Books(publisher_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_placement ON Books(placement_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_books_authors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Books_Authors (
            book_id INTEGER NOT NULL REFERENCES Books(book_id) ON DELETE CASCADE,
            author_id INTEGER NOT NULL REFERENCES Authors(author_id) ON DELETE CASCADE,
            author_ord INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (book_id, author_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_authors_author ON Books_Authors(author_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_books_subjects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Books_Subjects (
            book_id INTEGER NOT NULL REFERENCES Books(book_id) ON DELETE CASCADE,
            subject_id INTEGER NOT NULL REFERENCES Subjects(subject_id) ON DELETE CASCADE,
            PRIMARY KEY (book_id, subject_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'reader' CHECK (role IN ('admin', 'reader')),
            is_active INTEGER NOT NULL DEFAULT 1,
            force_password_change INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_login TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_user_preferences_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS UserPreferences (
            user_id INTEGER PRIMARY KEY REFERENCES Users(user_id) ON DELETE CASCADE,
            logo_path TEXT,
            bg_color TEXT,
            fg_color TEXT,
            text_size TEXT NOT NULL DEFAULT 'medium',
            per_page INTEGER NOT NULL DEFAULT 25,
            show_cover INTEGER NOT NULL DEFAULT 1,
            show_subtitle INTEGER NOT NULL DEFAULT 1,
            show_series INTEGER NOT NULL DEFAULT 1,
            show_is_hungarian INTEGER NOT NULL DEFAULT 1,
            show_publisher INTEGER NOT NULL DEFAULT 1,
            show_year INTEGER NOT NULL DEFAULT 1,
            show_status INTEGER NOT NULL DEFAULT 1,
            show_placement INTEGER NOT NULL DEFAULT 1,
            show_isbn INTEGER NOT NULL DEFAULT 0,
            show_loaned_to INTEGER NOT NULL DEFAULT 0,
            show_loaned_date INTEGER NOT NULL DEFAULT 0,
            show_subjects INTEGER NOT NULL DEFAULT 0,
            show_notes INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Sessions (
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES Users(user_id) ON DELETE CASCADE,
            username TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_seen TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON Sessions(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_auth_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS AuthEvents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            username_snapshot TEXT,
            event_type TEXT NOT NULL,
            ip_address TEXT,
            user_agent TEXT,
            details TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_auth_events_created ON AuthEvents(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_system_info_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS SystemInfo (
            key_name TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_duplicate_review_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duplicate_review (
            dup_key TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'NEW' CHECK (status IN ('NEW', 'IGNORE', 'CONFIRMED')),
            note TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn record_install_date(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO SystemInfo (key_name, value)
        VALUES ('install_date', datetime('now'))
        ON CONFLICT(key_name) DO NOTHING
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Read a single SystemInfo value
pub async fn read_system_info(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, Option<String>>(
        "SELECT value FROM SystemInfo WHERE key_name = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?
    .flatten();
    Ok(value)
}

async fn upsert_system_info(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO SystemInfo (key_name, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key_name) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Bring `app_version` and `schema_version` up to date
///
/// Failures are logged, never returned: an outdated SystemInfo row must not
/// keep the catalog from starting.
pub async fn sync_system_info(pool: &SqlitePool, app_version: &str) {
    for (key, value) in [("app_version", app_version.trim()), ("schema_version", SCHEMA_VERSION)] {
        if value.is_empty() {
            continue;
        }
        match read_system_info(pool, key).await {
            Ok(Some(current)) if current == value => {}
            Ok(previous) => match upsert_system_info(pool, key, value).await {
                Ok(()) => info!(
                    "SystemInfo {} updated: {} -> {}",
                    key,
                    previous.as_deref().unwrap_or("(none)"),
                    value
                ),
                Err(e) => warn!("Failed to update SystemInfo {}: {}", key, e),
            },
            Err(e) => warn!("Failed to read SystemInfo {}: {}", key, e),
        }
    }
}
