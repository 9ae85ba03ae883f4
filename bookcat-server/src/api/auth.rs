//! Session authentication
//!
//! The `bookcat_session` cookie carries a random token. A global middleware
//! resolves it to a [`CurrentUser`] stored in the request extensions; the
//! route-group layers [`require_login`] and [`require_admin`] turn a
//! missing or insufficient session into 401/403.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use bookcat_common::password::{hash_password, policy_errors, verify_password};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::db::{auth_events, preferences, sessions, users};
use crate::error::{ApiError, ApiResult};
use crate::fields::Fields;
use crate::AppState;

pub const SESSION_COOKIE: &str = "bookcat_session";

/// Pause before answering a failed credential check
const AUTH_FAILURE_DELAY: Duration = Duration::from_millis(200);

/// The logged-in user of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: i64,
    pub username: String,
    pub role: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == users::ROLE_ADMIN
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
    }
}

/// Client details recorded with auth events
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_cf: Option<String>,
    pub ip_remote: Option<String>,
    pub user_agent: Option<String>,
    /// Request reached the proxy over HTTPS
    pub secure: bool,
}

impl RequestMeta {
    pub fn from_parts(parts: &Parts) -> Self {
        let header_text = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let ip_remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let secure = header_text("x-forwarded-proto").is_some_and(|p| p.eq_ignore_ascii_case("https"));

        Self {
            ip_cf: header_text("cf-connecting-ip"),
            ip_remote,
            user_agent: header_text(header::USER_AGENT.as_str()),
            secure,
        }
    }

    /// Cloudflare client address, else the socket peer
    pub fn ip_address(&self) -> &str {
        self.ip_cf.as_deref().or(self.ip_remote.as_deref()).unwrap_or("")
    }

    /// Event details: known addresses first, then `extra`
    pub fn details(&self, extra: Value) -> Value {
        let mut map = Map::new();
        if let Some(ip) = &self.ip_cf {
            map.insert("ip_cf".to_string(), Value::String(ip.clone()));
        }
        if let Some(ip) = &self.ip_remote {
            map.insert("ip_remote".to_string(), Value::String(ip.clone()));
        }
        if let Value::Object(extra) = extra {
            map.extend(extra);
        }
        Value::Object(map)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Record an auth event; failures are logged and otherwise ignored
pub async fn log_auth_event(
    state: &AppState,
    meta: &RequestMeta,
    event_type: &str,
    user_id: Option<i64>,
    username: Option<&str>,
    extra: Value,
) {
    let event = auth_events::NewAuthEvent {
        event_type,
        user_id,
        username,
        ip_address: meta.ip_address(),
        user_agent: meta.user_agent.as_deref(),
        details: Some(meta.details(extra)),
    };
    if let Err(e) = auth_events::insert_event(&state.db, &event).await {
        warn!("Failed to record auth event {}: {}", event_type, e);
    }
}

/// Session token from the `Cookie` header
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn cookie_header(value: String) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|e| ApiError::Internal(format!("Invalid cookie header: {}", e)))
}

/// `Set-Cookie` value for a fresh session
pub fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie
pub fn expired_cookie(secure: bool) -> String {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Resolve the session cookie (applied to every route)
pub async fn session_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = session_token(request.headers()) {
        match sessions::find_session(&state.db, &token, state.session_idle_minutes).await {
            Ok(Some(session)) => {
                request.extensions_mut().insert(CurrentUser {
                    user_id: session.user_id,
                    username: session.username,
                    role: session.role,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

/// 401 unless the request carries a session
pub async fn require_login(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<CurrentUser>().is_none() {
        return Err(ApiError::Unauthorized("Not authenticated".to_string()));
    }
    Ok(next.run(request).await)
}

/// 401 without a session, 403 for non-admins
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    match request.extensions().get::<CurrentUser>() {
        None => Err(ApiError::Unauthorized("Not authenticated".to_string())),
        Some(user) if !user.is_admin() => Err(ApiError::Forbidden("Admin required".to_string())),
        Some(_) => Ok(next.run(request).await),
    }
}

/// POST /api/login
pub async fn login(State(state): State<AppState>, meta: RequestMeta, headers: HeaderMap, fields: Fields) -> ApiResult<Response> {
    let username = fields.text("username").map(|u| u.trim().to_string()).unwrap_or_default();
    let password = fields.text("password").unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Missing credentials"));
    }

    let user = users::find_by_username(&state.db, &username).await?;
    let failure = match &user {
        None => Some("user_not_found"),
        Some(u) if u.is_active == 0 => Some("inactive"),
        Some(u) if !verify_password(&password, &u.password_hash) => Some("bad_password"),
        Some(_) => None,
    };

    let user = match (failure, user) {
        (None, Some(user)) => user,
        (reason, user) => {
            tokio::time::sleep(AUTH_FAILURE_DELAY).await;
            let reason = reason.unwrap_or("user_not_found");
            log_auth_event(
                &state,
                &meta,
                "login_failed",
                user.map(|u| u.user_id),
                Some(&username),
                json!({ "reason": reason }),
            )
            .await;
            info!("Login failed for '{}': {}", username, reason);
            return Err(ApiError::Unauthorized("Invalid username or password".to_string()));
        }
    };

    if let Some(old) = session_token(&headers) {
        sessions::delete_session(&state.db, &old).await?;
    }
    let token = sessions::create_session(&state.db, user.user_id, &user.username, &user.role).await?;
    let lapsed = sessions::purge_expired(&state.db, state.session_idle_minutes).await?;
    if lapsed > 0 {
        debug!("Purged {} lapsed sessions", lapsed);
    }
    users::touch_last_login(&state.db, user.user_id).await?;
    log_auth_event(
        &state,
        &meta,
        "login_success",
        Some(user.user_id),
        Some(&user.username),
        json!({ "role": user.role }),
    )
    .await;
    info!("User '{}' logged in", user.username);

    let body = Json(json!({
        "ok": true,
        "data": { "user": { "username": user.username, "role": user.role } },
    }));
    Ok((
        [(header::SET_COOKIE, cookie_header(session_cookie(&token, meta.secure))?)],
        body,
    )
        .into_response())
}

/// POST /api/logout
pub async fn logout(
    State(state): State<AppState>,
    meta: RequestMeta,
    user: Option<CurrentUser>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if let Some(user) = &user {
        log_auth_event(
            &state,
            &meta,
            "logout",
            Some(user.user_id),
            Some(&user.username),
            json!({ "role": user.role }),
        )
        .await;
    }
    if let Some(token) = session_token(&headers) {
        sessions::delete_session(&state.db, &token).await?;
    }
    Ok((
        [(header::SET_COOKIE, cookie_header(expired_cookie(meta.secure))?)],
        Json(json!({ "ok": true, "data": null })),
    )
        .into_response())
}

/// GET /api/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<Value>> {
    let force = users::find_by_id(&state.db, user.user_id)
        .await?
        .map(|u| u.force_password_change)
        .unwrap_or(0);
    let prefs = preferences::fetch_preferences(&state.db, user.user_id).await?;
    Ok(Json(json!({
        "ok": true,
        "data": {
            "user": {
                "username": user.username,
                "role": user.role,
                "force_password_change": force,
            },
            "preferences": prefs,
        },
    })))
}

/// POST /api/change_password
pub async fn change_password(
    State(state): State<AppState>,
    meta: RequestMeta,
    user: CurrentUser,
    fields: Fields,
) -> ApiResult<Json<Value>> {
    let current = fields.text_any(&["current_password", "currentPassword"]).unwrap_or_default();
    let new = fields.text_any(&["new_password", "newPassword"]).unwrap_or_default();
    if current.is_empty() || new.is_empty() {
        return Err(ApiError::bad_request("Current and new password are required"));
    }

    let account = users::find_by_id(&state.db, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if !verify_password(&current, &account.password_hash) {
        tokio::time::sleep(AUTH_FAILURE_DELAY).await;
        log_auth_event(
            &state,
            &meta,
            "password_change_failed",
            Some(user.user_id),
            Some(&user.username),
            json!({ "reason": "bad_current_password" }),
        )
        .await;
        return Err(ApiError::Unauthorized("Invalid current password".to_string()));
    }

    let problems = policy_errors(&new, &user.username);
    if !problems.is_empty() {
        return Err(ApiError::PasswordPolicy {
            status: axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            details: problems,
        });
    }

    let hash = hash_password(&new)?;
    users::set_password(&state.db, user.user_id, &hash, false).await?;
    log_auth_event(&state, &meta, "password_change", Some(user.user_id), Some(&user.username), json!({})).await;
    info!("User '{}' changed their password", user.username);

    Ok(Json(json!({ "ok": true, "message": "Password updated" })))
}
