//! HTTP API handlers for the book catalog

pub mod auth;
pub mod authors;
pub mod backup;
pub mod books;
pub mod covers;
pub mod duplicates;
pub mod export;
pub mod health;
pub mod import;
pub mod orphans;
pub mod preferences;
pub mod publishers;
pub mod status;
pub mod ui;
pub mod users;

pub use auth::{
    change_password, login, logout, me, require_admin, require_login, session_middleware,
    CurrentUser,
};
pub use authors::{create_author, delete_author, list_authors, search_authors, update_author};
pub use backup::full_backup;
pub use books::{create_book, delete_book, get_book, list_books, update_book};
pub use covers::{delete_cover, normalize_covers, rebuild_thumbs, upload_cover};
pub use duplicates::{export_duplicates_csv, list_duplicates, review_duplicate};
pub use export::{export_books_csv, export_books_json, export_covers_zip};
pub use health::health_routes;
pub use import::import_csv;
pub use orphans::{list_orphans, orphan_action};
pub use preferences::{get_preferences, update_preferences};
pub use publishers::{search_publishers, suggest_publishers};
pub use status::{admin_warnings, runtime_status};
pub use ui::{serve_index, static_routes};
pub use users::{
    create_user, delete_user, list_auth_events, list_users, purge_auth_events, reset_password,
    update_user,
};

use crate::error::{ApiError, ApiResult};

/// Run filesystem or image work off the async runtime
pub(crate) async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Background task failed: {}", e)))?
}
