//! Author administration and autocomplete

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bookcat_common::authors::{format_display, format_sort, parse_free_text};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::db::authors::{self, AuthorInput, CreateOutcome, UpdateOutcome};
use crate::db::SortDir;
use crate::error::{ApiError, ApiResult};
use crate::fields::{parse_int, Fields};
use crate::pagination::{calculate_pagination, ADMIN_PAGES};
use crate::AppState;

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct AuthorsQuery {
    pub q: Option<String>,
    pub page: Option<String>,
    pub per: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
}

/// GET /api/authors
pub async fn list_authors(
    State(state): State<AppState>,
    Query(query): Query<AuthorsQuery>,
) -> ApiResult<Json<Value>> {
    let pagination = calculate_pagination(
        query.page.as_deref().and_then(parse_int),
        query.per.as_deref().and_then(parse_int),
        ADMIN_PAGES,
    );
    let sort = query.sort.as_deref().map(str::trim).unwrap_or("name");
    let dir = SortDir::parse(query.dir.as_deref(), SortDir::Asc);

    let (rows, total) = authors::list_authors(
        &state.db,
        query.q.as_deref().unwrap_or(""),
        sort,
        dir,
        pagination,
    )
    .await?;

    Ok(Json(json!({
        "ok": true,
        "data": { "rows": rows, "total": total, "page": pagination.page, "per": pagination.per_page },
    })))
}

fn hungarian_flag(fields: &Fields) -> Option<bool> {
    if fields.has("is_hungarian") {
        fields.flag("is_hungarian")
    } else {
        None
    }
}

/// Fill in whichever of name, parts and sort name the request left out
fn complete_input(fields: &Fields) -> AuthorInput {
    let is_hungarian = hungarian_flag(fields).unwrap_or(false);
    let mut name = fields.normalized("name");
    let mut first = fields.normalized("first_name");
    let mut last = fields.normalized("last_name");

    if let (Some(n), None, None) = (&name, &first, &last) {
        let parsed = parse_free_text(n, is_hungarian);
        first = Some(parsed.first).filter(|s| !s.is_empty());
        last = Some(parsed.last).filter(|s| !s.is_empty());
    }
    if name.is_none() {
        name = Some(format_display(first.as_deref(), last.as_deref(), is_hungarian)).filter(|s| !s.is_empty());
    }
    let sort_name = fields
        .normalized("sort_name")
        .or_else(|| Some(format_sort(first.as_deref(), last.as_deref())).filter(|s| !s.is_empty()));

    AuthorInput {
        name,
        first_name: first,
        last_name: last,
        sort_name,
        is_hungarian,
    }
}

/// POST /api/authors
///
/// An author already matching the sort name or name is returned instead of
/// a duplicate being created.
pub async fn create_author(
    State(state): State<AppState>,
    fields: Fields,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let input = complete_input(&fields);
    if input.name.is_none() && input.first_name.is_none() && input.last_name.is_none() {
        return Err(ApiError::bad_request("Author name or first/last is required"));
    }

    let outcome = authors::create_author(&state.db, &input).await?;
    let (status, id, existing) = match outcome {
        CreateOutcome::Existing(id) => (StatusCode::OK, id, true),
        CreateOutcome::Created(id) => {
            info!("Author {} created: {:?}", id, input.name);
            (StatusCode::CREATED, id, false)
        }
    };

    Ok((
        status,
        Json(json!({
            "ok": true,
            "data": {
                "id": id,
                "existing": existing,
                "affected_rows": if existing { 0 } else { 1 },
                "name": input.name,
                "first_name": input.first_name,
                "last_name": input.last_name,
                "sort_name": input.sort_name,
                "is_hungarian": i64::from(input.is_hungarian),
            },
        })),
    ))
}

fn author_id_from_path(raw: &str) -> ApiResult<i64> {
    match parse_int(raw) {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request("Invalid author_id")),
    }
}

/// PUT /api/authors/:id
///
/// With `is_hungarian` supplied, name and sort name are rebuilt from the
/// parts. Renaming onto another author's name merges this author into it.
pub async fn update_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
    fields: Fields,
) -> ApiResult<Json<Value>> {
    let author_id = author_id_from_path(&id)?;
    let is_hungarian = hungarian_flag(&fields);

    let first = fields.normalized("first_name");
    let last = fields.normalized("last_name");
    let (name, sort_name) = match is_hungarian {
        Some(hu) => (
            Some(format_display(first.as_deref(), last.as_deref(), hu)),
            Some(format_sort(first.as_deref(), last.as_deref())),
        ),
        None => (
            fields
                .normalized("name")
                .or_else(|| Some(format_display(first.as_deref(), last.as_deref(), false))),
            fields.normalized("sort_name"),
        ),
    };
    let name = name.filter(|s| !s.is_empty());
    if name.is_none() {
        return Err(ApiError::bad_request("Author name or first/last is required"));
    }

    let input = AuthorInput {
        name,
        first_name: first,
        last_name: last,
        sort_name: sort_name.filter(|s| !s.is_empty()),
        is_hungarian: is_hungarian.unwrap_or(false),
    };

    match authors::update_author(&state.db, author_id, &input, is_hungarian).await? {
        UpdateOutcome::MergedInto(target) => {
            info!("Author {} merged into {}", author_id, target);
            Ok(Json(json!({
                "ok": true,
                "data": { "id": author_id, "merged_into": target, "affected_rows": 1 },
            })))
        }
        UpdateOutcome::Updated { affected_rows } => Ok(Json(json!({
            "ok": true,
            "data": { "id": author_id, "affected_rows": affected_rows },
        }))),
    }
}

/// DELETE /api/authors/:id
pub async fn delete_author(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let author_id = author_id_from_path(&id)?;
    let (links_cleared, affected_rows) = authors::delete_author(&state.db, author_id).await?;
    info!("Author {} deleted ({} links cleared)", author_id, links_cleared);
    Ok(Json(json!({
        "ok": true,
        "data": { "id": author_id, "links_cleared": links_cleared, "affected_rows": affected_rows },
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

impl SearchQuery {
    pub fn term(&self) -> &str {
        self.q.as_deref().map(str::trim).unwrap_or("")
    }
}

/// GET /api/authors/search
///
/// Terms shorter than two characters return nothing.
pub async fn search_authors(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = query.term();
    if q.chars().count() < 2 {
        return Ok(Json(json!({ "ok": true, "data": [] })));
    }
    let rows = authors::search_authors(&state.db, q, SEARCH_LIMIT).await?;
    Ok(Json(json!({ "ok": true, "data": rows })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(value: Value) -> Fields {
        Fields::from_json_bytes(value.to_string().as_bytes())
    }

    #[test]
    fn test_complete_input_from_name() {
        let input = complete_input(&fields(json!({"name": "Ursula K. Le Guin"})));
        assert_eq!(input.first_name.as_deref(), Some("Ursula K. Le"));
        assert_eq!(input.last_name.as_deref(), Some("Guin"));
        assert_eq!(input.sort_name.as_deref(), Some("Guin, Ursula K. Le"));
        assert_eq!(input.name.as_deref(), Some("Ursula K. Le Guin"));
    }

    #[test]
    fn test_complete_input_from_parts() {
        let input = complete_input(&fields(json!({
            "first_name": "Mór",
            "last_name": "Jókai",
            "is_hungarian": true,
        })));
        assert_eq!(input.name.as_deref(), Some("Jókai Mór"));
        assert_eq!(input.sort_name.as_deref(), Some("Jókai, Mór"));
        assert!(input.is_hungarian);
    }

    #[test]
    fn test_complete_input_empty() {
        let input = complete_input(&fields(json!({"name": "  "})));
        assert!(input.name.is_none());
        assert!(input.first_name.is_none());
        assert!(input.last_name.is_none());
    }
}
