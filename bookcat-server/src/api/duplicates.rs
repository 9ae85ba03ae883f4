//! Duplicate-candidate report, CSV export and review decisions

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bookcat_common::duplicates::{ReviewStatus, StatusFilter};
use bookcat_common::text::{os_label, sanitize_label};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::db::duplicates::{self, DuplicateGroup};
use crate::error::{ApiError, ApiResult};
use crate::fields::Fields;
use crate::AppState;

const CSV_HEADER: [&str; 16] = [
    "group_index",
    "group_size",
    "group_dup_key",
    "group_status",
    "group_note",
    "group_title_display",
    "group_authors_display",
    "group_publishers",
    "book_id",
    "book_title",
    "book_subtitle",
    "book_authors",
    "publisher_name",
    "year_published",
    "isbn",
    "location",
];

#[derive(Debug, Default, Deserialize)]
pub struct DuplicatesQuery {
    pub status: Option<String>,
}

impl DuplicatesQuery {
    fn filter(&self) -> StatusFilter {
        StatusFilter::parse(self.status.as_deref())
    }
}

/// GET /api/duplicates
pub async fn list_duplicates(
    State(state): State<AppState>,
    Query(query): Query<DuplicatesQuery>,
) -> ApiResult<Json<Value>> {
    let filter = query.filter();
    let groups = duplicates::load_report(&state.db, filter).await?;
    Ok(Json(json!({
        "ok": true,
        "data": { "status": filter.as_str(), "total": groups.len(), "groups": groups },
    })))
}

/// One CSV row per book, group columns repeated
pub fn groups_to_csv(groups: &[DuplicateGroup]) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for (index, group) in groups.iter().enumerate() {
        for book in &group.books {
            writer.write_record([
                (index + 1).to_string(),
                group.size.to_string(),
                group.dup_key.clone(),
                group.status.to_string(),
                group.note.clone().unwrap_or_default(),
                group.title_display.clone(),
                group.authors_display.clone(),
                group.publishers.clone(),
                book.book_id.to_string(),
                book.title.clone(),
                book.subtitle.clone(),
                book.authors.join("; "),
                book.publisher_name.clone(),
                book.year_published.map(|y| y.to_string()).unwrap_or_default(),
                book.isbn.clone(),
                book.location.clone(),
            ])?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV write failed: {}", e)))
}

/// GET /api/duplicates/export.csv
pub async fn export_duplicates_csv(
    State(state): State<AppState>,
    Query(query): Query<DuplicatesQuery>,
) -> ApiResult<Response> {
    let filter = query.filter();
    let groups = duplicates::load_report(&state.db, filter).await?;
    let bytes = groups_to_csv(&groups)?;

    let filename = format!(
        "duplicate_candidates_{}_{}_{}.csv",
        sanitize_label(filter.as_str()),
        os_label(),
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    info!("Duplicate export: {} groups ({})", groups.len(), filter.as_str());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        bytes,
    )
        .into_response())
}

/// POST /api/duplicates/review
pub async fn review_duplicate(State(state): State<AppState>, fields: Fields) -> ApiResult<Json<Value>> {
    let Some(dup_key) = fields.text("dup_key").map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) else {
        return Err(ApiError::bad_request("Missing duplicate key."));
    };
    let status = match fields.text("status") {
        Some(raw) => ReviewStatus::parse(&raw).ok_or_else(|| ApiError::bad_request("Invalid status."))?,
        None => ReviewStatus::New,
    };
    let note = fields.normalized("note");

    duplicates::upsert_review(&state.db, &dup_key, status, note.as_deref()).await?;
    info!("Duplicate group '{}' marked {}", dup_key, status.as_str());

    Ok(Json(json!({
        "ok": true,
        "data": { "dup_key": dup_key, "status": status.as_str(), "note": note },
    })))
}
