//! Shared setup for bookcat-server integration tests

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use bookcat_common::config::RootLayout;
use bookcat_common::db::init_database;
use bookcat_common::password::hash_password;
use bookcat_server::db::{preferences, users};
use bookcat_server::{build_router, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const ADMIN: &str = "librarian";
pub const READER: &str = "visitor";
/// Satisfies the password policy for both test accounts
pub const PASSWORD: &str = "Str0ng!Passw0rd#";

const BOUNDARY: &str = "bookcat-test-boundary";

/// App over a temporary root folder; the folder lives as long as the value
pub struct TestApp {
    pub root: TempDir,
    pub state: AppState,
    pub app: Router,
}

impl TestApp {
    /// Fresh database with one admin and one reader account
    pub async fn new() -> Self {
        Self::with_backup_dir(None).await
    }

    pub async fn with_backup_dir(backup_dir: Option<String>) -> Self {
        let root = TempDir::new().unwrap();
        let layout = RootLayout::new(root.path().to_path_buf());
        layout.ensure_directories().unwrap();
        let pool = init_database(&layout.database_path()).await.unwrap();

        let dist = root.path().join("dist");
        std::fs::create_dir_all(dist.join("assets")).unwrap();
        std::fs::write(
            dist.join("index.html"),
            r#"<html><script src="/assets/app.js"></script></html>"#,
        )
        .unwrap();
        std::fs::write(dist.join("assets/app.js"), "console.log('bookcat')").unwrap();

        let hash = hash_password(PASSWORD).unwrap();
        for (username, role) in [(ADMIN, users::ROLE_ADMIN), (READER, users::ROLE_READER)] {
            let user_id = users::create_user(&pool, username, &hash, role).await.unwrap();
            preferences::ensure_preferences_row(&pool, user_id).await.unwrap();
        }

        let state = AppState::new(pool, layout, dist, backup_dir);
        let app = build_router(state.clone());
        Self { root, state, app }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Log in and return the `Cookie` header value for later requests
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .send(json_request(
                "POST",
                "/api/login",
                None,
                serde_json::json!({ "username": username, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response).expect("login sets the session cookie")
    }

    /// Send and decode a JSON response
    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        (status, extract_json(response).await)
    }
}

/// `name=value` of the response's Set-Cookie header
pub fn session_cookie(response: &Response) -> Option<String> {
    let raw = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    raw.split(';').next().map(|pair| pair.trim().to_string())
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Multipart request with text fields and one file part
pub fn multipart_request(
    uri: &str,
    cookie: &str,
    fields: &[(&str, &str)],
    file: (&str, &str, &[u8]),
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    let (name, file_name, bytes) = file;
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn extract_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn extract_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}
