//! Frontend serving
//!
//! `/` serves the built `dist/index.html` with cache-busting stamps on its
//! asset URLs; assets, covers and user assets are served from disk.

use std::path::Path;
use std::time::UNIX_EPOCH;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::services::ServeDir;
use tracing::warn;

use crate::AppState;

const ASSET_PREFIX: &str = "/assets/";
const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

fn modified_secs(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs())
}

/// Append `?v=<mtime>` to every `/assets/...` URL whose file exists under
/// `dist_dir`; URLs that already carry a query are left alone
pub fn stamp_asset_urls(html: &str, dist_dir: &Path) -> String {
    let mut out = String::with_capacity(html.len() + 64);
    let mut rest = html;
    while let Some(start) = rest.find(ASSET_PREFIX) {
        let (before, from_asset) = rest.split_at(start);
        out.push_str(before);
        let end = from_asset
            .find(|c: char| matches!(c, '"' | '\'' | '?' | '#' | ')' | '>') || c.is_whitespace())
            .unwrap_or(from_asset.len());
        let (url, after) = from_asset.split_at(end);
        out.push_str(url);
        if !after.starts_with('?') {
            let file = dist_dir.join(url.trim_start_matches('/'));
            if let Some(secs) = file.is_file().then(|| modified_secs(&file)).flatten() {
                out.push_str(&format!("?v={}", secs));
            }
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// GET /
pub async fn serve_index(State(state): State<AppState>) -> Response {
    let index = state.dist_dir.join("index.html");
    match tokio::fs::read_to_string(&index).await {
        Ok(html) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                (header::CACHE_CONTROL, NO_CACHE),
                (header::PRAGMA, "no-cache"),
            ],
            stamp_asset_urls(&html, &state.dist_dir),
        )
            .into_response(),
        Err(e) => {
            warn!("Cannot read {}: {}", index.display(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Missing dist/index.html",
            )
                .into_response()
        }
    }
}

/// Static file routes: built assets, cover uploads and user assets
pub fn static_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest_service("/assets", ServeDir::new(state.dist_dir.join("assets")))
        .nest_service("/uploads", ServeDir::new(state.layout.uploads_dir()))
        .nest_service("/user-assets", ServeDir::new(state.layout.user_assets_dir()))
}
