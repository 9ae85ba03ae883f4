//! Orphan maintenance: authors and publishers without books, dangling links

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::db::orphans::{self, AuthorEdit};
use crate::error::{ApiError, ApiResult};
use crate::fields::Fields;
use crate::AppState;

/// GET /api/orphans
pub async fn list_orphans(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let authors = orphans::orphan_authors(&state.db).await?;
    let publishers = orphans::orphan_publishers(&state.db).await?;
    let links = orphans::orphan_links(&state.db).await?;
    Ok(Json(json!({
        "ok": true,
        "data": {
            "orphan_authors": authors,
            "orphan_publishers": publishers,
            "orphan_links": links,
        },
    })))
}

fn positive(fields: &Fields, key: &str) -> Option<i64> {
    fields.int(key).filter(|id| *id > 0)
}

fn required(fields: &Fields, key: &str, message: &str) -> ApiResult<i64> {
    positive(fields, key).ok_or_else(|| ApiError::bad_request(message))
}

/// POST /api/orphans
///
/// Body: `{"action": ..., ...ids}`. Deletes refuse rows that are still
/// referenced.
pub async fn orphan_action(State(state): State<AppState>, fields: Fields) -> ApiResult<Json<Value>> {
    let action = fields.text("action").unwrap_or_default();
    let pool = &state.db;

    let data = match action.as_str() {
        "delete_author" => {
            let author_id = required(&fields, "author_id", "Invalid author_id")?;
            if orphans::author_has_links(pool, author_id).await? {
                return Err(ApiError::Conflict("Author still linked to books".to_string()));
            }
            let affected = orphans::delete_author_row(pool, author_id).await?;
            json!({ "id": author_id, "affected_rows": affected })
        }
        "delete_publisher" => {
            let publisher_id = required(&fields, "publisher_id", "Invalid publisher_id")?;
            if orphans::publisher_has_books(pool, publisher_id).await? {
                return Err(ApiError::Conflict("Publisher still linked to books".to_string()));
            }
            let affected = orphans::delete_publisher(pool, publisher_id).await?;
            json!({ "id": publisher_id, "affected_rows": affected })
        }
        "update_author" => {
            let author_id = required(&fields, "author_id", "Invalid author_id")?;
            let edit = AuthorEdit {
                name: fields.normalized("name"),
                first_name: fields.normalized("first_name"),
                last_name: fields.normalized("last_name"),
                sort_name: fields.normalized("sort_name"),
                is_hungarian: if fields.has("is_hungarian") {
                    fields.flag("is_hungarian")
                } else {
                    None
                },
            };
            let affected = orphans::edit_author(pool, author_id, &edit).await?;
            json!({ "id": author_id, "affected_rows": affected })
        }
        "update_publisher" => {
            let publisher_id = required(&fields, "publisher_id", "Invalid publisher_id")?;
            let name = fields
                .normalized("name")
                .ok_or_else(|| ApiError::bad_request("Publisher name is required"))?;
            let affected = orphans::rename_publisher(pool, publisher_id, &name).await?;
            json!({ "id": publisher_id, "affected_rows": affected })
        }
        "delete_link" => {
            let (Some(book_id), Some(author_id)) = (positive(&fields, "book_id"), positive(&fields, "author_id"))
            else {
                return Err(ApiError::bad_request("Invalid book_id/author_id"));
            };
            let affected = orphans::delete_link(pool, book_id, author_id).await?;
            json!({ "book_id": book_id, "author_id": author_id, "affected_rows": affected })
        }
        "reassign_link" => {
            let (Some(book_id), Some(author_id), Some(new_author_id)) = (
                positive(&fields, "book_id"),
                positive(&fields, "author_id"),
                positive(&fields, "new_author_id"),
            ) else {
                return Err(ApiError::bad_request("Invalid book_id/author_id/new_author_id"));
            };
            let affected = orphans::reassign_link(pool, book_id, author_id, new_author_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Target author not found"))?;
            json!({
                "book_id": book_id,
                "author_id": author_id,
                "new_author_id": new_author_id,
                "affected_rows": affected,
            })
        }
        _ => return Err(ApiError::bad_request("Unknown action")),
    };

    info!("Orphan maintenance: {} {}", action, data);
    Ok(Json(json!({ "ok": true, "data": data })))
}
