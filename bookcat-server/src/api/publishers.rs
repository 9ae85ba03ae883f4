//! Publisher autocomplete

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::api::authors::SearchQuery;
use crate::db::lookups;
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/publishers/search
///
/// Needs at least two characters; returns up to 10 names.
pub async fn search_publishers(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = query.term();
    if q.chars().count() < 2 {
        return Ok(Json(json!({ "ok": true, "data": [] })));
    }
    let rows = lookups::search_publishers(&state.db, q, 10).await?;
    Ok(Json(json!({ "ok": true, "data": rows })))
}

/// GET /api/publishers/suggest
///
/// Any non-empty term; returns up to 20 names.
pub async fn suggest_publishers(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = query.term();
    if q.is_empty() {
        return Ok(Json(json!({ "ok": true, "data": [] })));
    }
    let rows = lookups::search_publishers(&state.db, q, 20).await?;
    Ok(Json(json!({ "ok": true, "data": rows })))
}
