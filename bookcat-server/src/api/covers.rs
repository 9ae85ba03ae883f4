//! Cover upload and removal, plus the cover maintenance endpoints

use std::path::Path;

use axum::{
    extract::{Path as UrlPath, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::run_blocking;
use crate::db::books;
use crate::error::{ApiError, ApiResult};
use crate::fields::{parse_int, FormData, UploadedFile};
use crate::imaging::{thumbnail_to_width, ImageKind, COVER_THUMB_WIDTH, DEFAULT_THUMB_HEIGHT};
use crate::thumbs::{self, RebuildOptions};
use crate::uploads::{book_dir, relative_cover_path, remove_cover_files, resolve_stored_path, thumb_file_name};
use crate::AppState;

const COVER_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Check an uploaded cover's size and type
pub fn validate_cover(file: &UploadedFile) -> ApiResult<ImageKind> {
    let kind = ImageKind::sniff(&file.bytes)
        .ok_or_else(|| ApiError::UnsupportedMediaType("Unsupported image type".to_string()))?;
    if file.bytes.len() > COVER_MAX_BYTES {
        return Err(ApiError::PayloadTooLarge("Image exceeds 10 MB".to_string()));
    }
    Ok(kind)
}

/// Paths stored for a processed cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCover {
    pub image: String,
    /// `None` when the thumbnail could not be generated
    pub thumb: Option<String>,
}

/// Replace a book's cover files with a new image and its thumbnail
pub fn store_cover(uploads_dir: &Path, book_id: i64, kind: ImageKind, bytes: &[u8]) -> ApiResult<StoredCover> {
    let dir = book_dir(uploads_dir, book_id);
    std::fs::create_dir_all(&dir)?;
    remove_cover_files(&dir);

    let cover_name = format!("cover.{}", kind.extension());
    let cover_path = dir.join(&cover_name);
    std::fs::write(&cover_path, bytes)?;

    let thumb_name = thumb_file_name(kind);
    let thumb = match thumbnail_to_width(&cover_path, &dir.join(&thumb_name), COVER_THUMB_WIDTH, kind) {
        Ok(()) => Some(relative_cover_path(book_id, &thumb_name)),
        Err(e) => {
            warn!("Thumbnail failed for book {}: {}", book_id, e);
            None
        }
    };

    Ok(StoredCover {
        image: relative_cover_path(book_id, &cover_name),
        thumb,
    })
}

/// POST /api/covers
pub async fn upload_cover(State(state): State<AppState>, form: FormData) -> ApiResult<Json<Value>> {
    let book_id = form.fields.int("book_id").unwrap_or(0);
    if book_id <= 0 {
        return Err(ApiError::bad_request("Invalid book_id"));
    }
    let file = form
        .file("image")
        .cloned()
        .ok_or_else(|| ApiError::bad_request("No file uploaded or upload error"))?;
    let kind = validate_cover(&file)?;

    if books::cover_paths(&state.db, book_id).await?.is_none() {
        return Err(ApiError::not_found("Book not found"));
    }

    let uploads = state.layout.uploads_dir();
    let stored = run_blocking(move || store_cover(&uploads, book_id, kind, &file.bytes)).await?;

    let mut conn = state.db.acquire().await?;
    let affected = books::set_cover(&mut *conn, book_id, Some(&stored.image), stored.thumb.as_deref()).await?;
    info!("Stored cover for book {}: {}", book_id, stored.image);

    Ok(Json(json!({
        "ok": true,
        "data": {
            "id": book_id,
            "affected_rows": affected,
            "path": stored.image,
            "thumb": stored.thumb,
        },
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteCoverQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// DELETE /api/covers/:book_id
///
/// Only files under `uploads/` are removed. `type=back` is accepted for old
/// clients; there are no back covers left to delete.
pub async fn delete_cover(
    State(state): State<AppState>,
    UrlPath(book_id): UrlPath<String>,
    Query(query): Query<DeleteCoverQuery>,
) -> ApiResult<Json<Value>> {
    let book_id = parse_int(&book_id).unwrap_or(0);
    let kind = query.kind.unwrap_or_else(|| "cover".to_string());
    if book_id <= 0 || !matches!(kind.as_str(), "cover" | "back") {
        return Err(ApiError::bad_request("Invalid parameters"));
    }

    let (image, thumb) = books::cover_paths(&state.db, book_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;
    if kind == "back" {
        return Ok(Json(json!({
            "ok": true,
            "data": { "id": book_id, "affected_rows": 0, "type": kind },
        })));
    }

    let root = state.layout.root().to_path_buf();
    let targets: Vec<_> = [image, thumb]
        .into_iter()
        .flatten()
        .filter_map(|stored| resolve_stored_path(&root, &stored))
        .collect();
    run_blocking(move || {
        for path in targets.into_iter().filter(|p| p.is_file()) {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to delete {}: {}", path.display(), e);
            }
        }
        Ok(())
    })
    .await?;

    let mut conn = state.db.acquire().await?;
    let affected = books::set_cover(&mut *conn, book_id, None, None).await?;
    info!("Cleared cover of book {}", book_id);

    Ok(Json(json!({
        "ok": true,
        "data": { "id": book_id, "affected_rows": affected, "type": kind },
    })))
}

/// Query flags of the maintenance endpoints; all optional
#[derive(Debug, Default, Deserialize)]
pub struct MaintenanceQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub h: Option<String>,
    pub re: Option<String>,
    pub dry: Option<String>,
}

/// Present and not `"0"`
fn flag_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| v != "0")
}

fn number(value: &Option<String>) -> Option<i64> {
    value.as_deref().and_then(parse_int)
}

/// POST /api/maintenance/rebuild_thumbs
pub async fn rebuild_thumbs(
    State(state): State<AppState>,
    Query(query): Query<MaintenanceQuery>,
) -> ApiResult<Json<Value>> {
    let opts = RebuildOptions {
        limit: number(&query.limit).unwrap_or(200).max(0) as usize,
        offset: number(&query.offset).unwrap_or(0).max(0) as usize,
        height: number(&query.h).unwrap_or(i64::from(DEFAULT_THUMB_HEIGHT)).clamp(40, 4000) as u32,
        force: flag_set(&query.re),
    };

    let uploads = state.layout.uploads_dir();
    let mut report = run_blocking(move || Ok(thumbs::rebuild_pass(&uploads, opts))).await?;
    if let Err(e) = thumbs::apply_thumbs(&state.db, &report.thumbs).await {
        warn!("Thumbnail paths not stored: {}", e);
        if report.errors.len() < thumbs::MAX_REPORTED_ERRORS {
            report.errors.push(format!("DB update error: {}", e));
        }
    }
    info!(
        "Thumbnail rebuild: scanned {}, updated {}, skipped {}",
        report.scanned, report.updated, report.skipped
    );

    Ok(Json(json!({ "ok": true, "data": report })))
}

/// POST /api/maintenance/normalize_covers
pub async fn normalize_covers(
    State(state): State<AppState>,
    Query(query): Query<MaintenanceQuery>,
) -> ApiResult<Json<Value>> {
    let dry_run = flag_set(&query.dry);
    let force = flag_set(&query.re);
    let height = number(&query.h)
        .map(|h| h.clamp(60, 4000))
        .unwrap_or(i64::from(DEFAULT_THUMB_HEIGHT)) as u32;

    let uploads = state.layout.uploads_dir();
    let mut report =
        run_blocking(move || Ok(thumbs::normalize_pass(&uploads, dry_run, force, height)?)).await?;
    if !dry_run {
        report.db_rows_updated = thumbs::apply_covers(&state.db, &report.covers).await?;
    }
    info!(
        "Cover normalization (dry run: {}): renamed {}, thumbs {}, legacy deleted {}",
        dry_run, report.renamed, report.thumbs_rebuilt, report.deleted_legacy
    );

    Ok(Json(json!({ "ok": true, "data": report })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::StatusCode;

    fn upload(bytes: Vec<u8>) -> UploadedFile {
        UploadedFile {
            file_name: "cover.bin".into(),
            content_type: None,
            bytes: Bytes::from(bytes),
        }
    }

    #[test]
    fn test_validate_cover() {
        let err = validate_cover(&upload(b"%PDF-1.4 not an image".to_vec())).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let mut big = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        big.resize(COVER_MAX_BYTES + 1, 0);
        let err = validate_cover(&upload(big)).unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_flag_set() {
        assert!(flag_set(&Some("1".into())));
        assert!(flag_set(&Some("".into())));
        assert!(!flag_set(&Some("0".into())));
        assert!(!flag_set(&None));
    }
}
