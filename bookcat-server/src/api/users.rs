//! User administration (admin only)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bookcat_common::password::{hash_password, policy_errors};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::auth::{log_auth_event, CurrentUser, RequestMeta};
use crate::db::auth_events::{self, EventFilter, PURGE_MONTHS};
use crate::db::{sessions, users};
use crate::error::{ApiError, ApiResult};
use crate::fields::{parse_int, Fields};
use crate::pagination::{calculate_pagination, ADMIN_PAGES};
use crate::AppState;

fn require_user_id(raw: &str) -> ApiResult<i64> {
    let user_id = parse_int(raw).unwrap_or(0);
    if user_id <= 0 {
        return Err(ApiError::bad_request("user_id is required"));
    }
    Ok(user_id)
}

/// GET /api/users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rows = users::list_users(&state.db).await?;
    Ok(Json(json!({ "ok": true, "data": { "rows": rows } })))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    meta: RequestMeta,
    actor: CurrentUser,
    fields: Fields,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let username = fields.normalized("username").unwrap_or_default();
    let password = fields.text("password").unwrap_or_default();
    let role = fields
        .normalized("role")
        .unwrap_or_else(|| users::ROLE_READER.to_string());

    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    if password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }
    if !users::is_valid_role(&role) {
        return Err(ApiError::bad_request("Invalid role"));
    }
    let problems = policy_errors(&password, &username);
    if !problems.is_empty() {
        return Err(ApiError::PasswordPolicy {
            status: StatusCode::BAD_REQUEST,
            details: problems,
        });
    }
    if users::username_exists(&state.db, &username).await? {
        return Err(ApiError::Conflict("Username already exists".to_string()));
    }

    let hash = hash_password(&password)?;
    let user_id = users::create_user(&state.db, &username, &hash, &role).await?;
    log_auth_event(
        &state,
        &meta,
        "user_created",
        Some(user_id),
        Some(&username),
        json!({ "actor_user_id": actor.user_id, "actor_username": actor.username, "role": role }),
    )
    .await;
    info!("User '{}' created by '{}' with role {}", username, actor.username, role);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "data": { "user_id": user_id, "username": username, "role": role, "is_active": 1 },
        })),
    ))
}

/// PATCH /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    meta: RequestMeta,
    actor: CurrentUser,
    Path(user_id): Path<String>,
    fields: Fields,
) -> ApiResult<Json<Value>> {
    let user_id = require_user_id(&user_id)?;

    let role = if fields.has("role") {
        let role = fields.normalized("role").unwrap_or_default();
        if !users::is_valid_role(&role) {
            return Err(ApiError::bad_request("Invalid role"));
        }
        Some(role)
    } else {
        None
    };
    let is_active = if fields.has("is_active") {
        fields.flag("is_active")
    } else {
        None
    };
    if role.is_none() && is_active.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let current = users::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let was_active = current.is_active != 0;
    let next_role = role.clone().unwrap_or_else(|| current.role.clone());
    let next_active = is_active.unwrap_or(was_active);

    let active_admin_now = current.role == users::ROLE_ADMIN && was_active;
    let active_admin_next = next_role == users::ROLE_ADMIN && next_active;
    if active_admin_now && !active_admin_next && users::count_active_admins(&state.db).await? <= 1 {
        return Err(ApiError::bad_request("Cannot disable the last active admin"));
    }

    users::update_user(&state.db, user_id, role.as_deref(), is_active).await?;

    if next_role != current.role {
        sessions::refresh_user_sessions(&state.db, user_id, &next_role).await?;
        log_auth_event(
            &state,
            &meta,
            "role_change",
            Some(user_id),
            Some(&current.username),
            json!({
                "actor_user_id": actor.user_id,
                "actor_username": actor.username,
                "previous_role": current.role,
                "new_role": next_role,
            }),
        )
        .await;
    }
    if let Some(active) = is_active {
        if active != was_active {
            if !active {
                sessions::delete_user_sessions(&state.db, user_id).await?;
            }
            log_auth_event(
                &state,
                &meta,
                if active { "user_enabled" } else { "user_disabled" },
                Some(user_id),
                Some(&current.username),
                json!({
                    "actor_user_id": actor.user_id,
                    "actor_username": actor.username,
                    "previous_active": i64::from(was_active),
                    "new_active": i64::from(active),
                }),
            )
            .await;
        }
    }
    info!("User {} updated by '{}'", user_id, actor.username);

    Ok(Json(json!({
        "ok": true,
        "data": { "user_id": user_id, "role": next_role, "is_active": i64::from(next_active) },
    })))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    meta: RequestMeta,
    actor: CurrentUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user_id = require_user_id(&user_id)?;
    if user_id == actor.user_id {
        return Err(ApiError::bad_request("Cannot delete the currently logged-in user"));
    }
    let target = users::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if target.role == users::ROLE_ADMIN && users::count_admins(&state.db).await? <= 1 {
        return Err(ApiError::bad_request("Cannot delete the last admin"));
    }

    let deleted = users::delete_user(&state.db, user_id).await?;
    log_auth_event(
        &state,
        &meta,
        "user_deleted",
        Some(user_id),
        Some(&target.username),
        json!({ "actor_user_id": actor.user_id, "actor_username": actor.username }),
    )
    .await;
    info!("User '{}' deleted by '{}'", target.username, actor.username);

    Ok(Json(json!({ "ok": true, "data": { "deleted": deleted } })))
}

/// POST /api/users/:id/reset_password
pub async fn reset_password(
    State(state): State<AppState>,
    meta: RequestMeta,
    actor: CurrentUser,
    Path(user_id): Path<String>,
    fields: Fields,
) -> ApiResult<Json<Value>> {
    let user_id = require_user_id(&user_id)?;
    let password = fields
        .text_any(&["newPassword", "new_password"])
        .unwrap_or_default();
    if password.is_empty() {
        return Err(ApiError::bad_request("New password is required"));
    }

    let target = users::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let problems = policy_errors(&password, &target.username);
    if !problems.is_empty() {
        return Err(ApiError::PasswordPolicy {
            status: StatusCode::BAD_REQUEST,
            details: problems,
        });
    }

    let hash = hash_password(&password)?;
    users::set_password(&state.db, user_id, &hash, true).await?;
    sessions::delete_user_sessions(&state.db, user_id).await?;
    log_auth_event(
        &state,
        &meta,
        "admin_reset_password",
        Some(user_id),
        Some(&target.username),
        json!({ "actor_user_id": actor.user_id, "actor_username": actor.username }),
    )
    .await;
    info!("Password of '{}' reset by '{}'", target.username, actor.username);

    Ok(Json(json!({ "ok": true, "data": null })))
}

/// Query parameters for the auth event log
#[derive(Debug, Default, Deserialize)]
pub struct AuthEventsQuery {
    pub page: Option<String>,
    pub per: Option<String>,
    pub per_page: Option<String>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub q: Option<String>,
}

/// GET /api/auth_events
pub async fn list_auth_events(
    State(state): State<AppState>,
    Query(query): Query<AuthEventsQuery>,
) -> ApiResult<Json<Value>> {
    let per = query.per.as_deref().or(query.per_page.as_deref()).and_then(parse_int);
    let pagination = calculate_pagination(query.page.as_deref().and_then(parse_int), per, ADMIN_PAGES);
    let filter = EventFilter {
        event_type: query.event_type,
        user_id: query.user_id.as_deref().and_then(parse_int),
        q: query.q,
    };

    let (rows, total) = auth_events::list_events(&state.db, &filter, pagination).await?;
    Ok(Json(json!({
        "ok": true,
        "data": {
            "rows": rows,
            "meta": { "page": pagination.page, "per_page": pagination.per_page, "total": total },
        },
    })))
}

/// POST /api/auth_events/purge
pub async fn purge_auth_events(State(state): State<AppState>, fields: Fields) -> ApiResult<Json<Value>> {
    let months = fields.int("months").unwrap_or(0);
    if !PURGE_MONTHS.contains(&months) {
        return Err(ApiError::bad_request("Invalid months value"));
    }
    let deleted = auth_events::purge_older_than(&state.db, months).await?;
    info!("Purged {} auth events older than {} months", deleted, months);
    Ok(Json(json!({ "ok": true, "data": { "deleted": deleted, "months": months } })))
}
