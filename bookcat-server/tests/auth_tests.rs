//! Integration tests for login sessions, accounts and preferences

mod helpers;

use axum::http::StatusCode;
use axum::body::Body;
use axum::http::{header, Request};
use helpers::{get, json_request, session_cookie, TestApp, ADMIN, PASSWORD, READER};
use serde_json::json;

async fn user_id(app: &TestApp, username: &str) -> i64 {
    bookcat_server::db::users::find_by_username(&app.state.db, username)
        .await
        .unwrap()
        .unwrap()
        .user_id
}

fn delete_request(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(json_request("POST", "/api/login", None, json!({ "username": ADMIN })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing credentials");

    let (status, body) = app
        .call(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": ADMIN, "password": "Wrong!Passw0rd#" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid username or password");

    // Unknown users get the same answer
    let (status, body) = app
        .call(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": "ghost", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid username or password");
}

#[tokio::test]
async fn test_login_me_logout() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": ADMIN, "password": PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).unwrap();
    assert!(cookie.starts_with("bookcat_session="));
    let body = helpers::extract_json(response).await;
    assert_eq!(body["data"]["user"]["username"], ADMIN);
    assert_eq!(body["data"]["user"]["role"], "admin");

    let (status, body) = app.call(get("/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["username"], ADMIN);
    assert_eq!(body["data"]["user"]["force_password_change"], 0);
    assert!(body["data"]["preferences"].is_object());

    let (status, _) = app
        .call(json_request("POST", "/api/logout", Some(&cookie), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call(get("/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_events_are_logged() {
    let app = TestApp::new().await;
    let _ = app
        .call(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": READER, "password": "Wrong!Passw0rd#" }),
        ))
        .await;
    let cookie = app.login(ADMIN).await;

    let (status, body) = app.call(get("/api/auth_events", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = body["data"]["rows"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["event_type"].as_str())
        .collect();
    assert!(types.contains(&"login_failed"));
    assert!(types.contains(&"login_success"));

    let (status, body) = app
        .call(json_request("POST", "/api/auth_events/purge", Some(&cookie), json!({ "months": 5 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid months value");
}

#[tokio::test]
async fn test_change_password_enforces_policy() {
    let app = TestApp::new().await;
    let cookie = app.login(READER).await;

    let (status, _) = app
        .call(json_request(
            "POST",
            "/api/change_password",
            Some(&cookie),
            json!({ "current_password": "nope", "new_password": "An0ther!Passw0rd" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(json_request(
            "POST",
            "/api/change_password",
            Some(&cookie),
            json!({ "current_password": PASSWORD, "new_password": "short" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!body["details"].as_array().unwrap().is_empty());

    let (status, _) = app
        .call(json_request(
            "POST",
            "/api/change_password",
            Some(&cookie),
            json!({ "currentPassword": PASSWORD, "newPassword": "An0ther!Passw0rd" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": READER, "password": "An0ther!Passw0rd" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_manages_users() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;

    let (status, body) = app
        .call(json_request(
            "POST",
            "/api/users",
            Some(&cookie),
            json!({ "username": "clerk", "password": "clerk12345678", "role": "reader" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].is_array());

    let (status, body) = app
        .call(json_request(
            "POST",
            "/api/users",
            Some(&cookie),
            json!({ "username": "clerk", "password": "Cl3rk!Passw0rd#", "role": "reader" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let clerk_id = body["data"]["user_id"].as_i64().unwrap();

    let (status, _) = app
        .call(json_request(
            "POST",
            "/api/users",
            Some(&cookie),
            json!({ "username": "clerk", "password": "Cl3rk!Passw0rd#" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A reset forces a password change on next login and ends open sessions
    let clerk_cookie = app.login("clerk").await;
    let (status, _) = app
        .call(json_request(
            "POST",
            &format!("/api/users/{}/reset_password", clerk_id),
            Some(&cookie),
            json!({ "new_password": "R3set!Passw0rd#" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.call(get("/api/me", Some(&clerk_cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call(get("/api/users", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rows"].as_array().unwrap().len(), 3);

    let admin_id = bookcat_server::db::users::find_by_username(&app.state.db, ADMIN)
        .await
        .unwrap()
        .unwrap()
        .user_id;
    let delete = |id: i64| {
        axum::http::Request::builder()
            .method("DELETE")
            .uri(format!("/api/users/{}", id))
            .header(axum::http::header::COOKIE, cookie.clone())
            .body(axum::body::Body::empty())
            .unwrap()
    };
    let (status, body) = app.call(delete(admin_id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot delete the currently logged-in user");

    let (status, body) = app.call(delete(clerk_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 1);
}

#[tokio::test]
async fn test_preferences_round_trip() {
    let app = TestApp::new().await;
    let cookie = app.login(READER).await;

    let (status, body) = app
        .call(json_request(
            "POST",
            "/api/preferences",
            Some(&cookie),
            json!({ "per_page": 50, "text_size": "large", "show_cover": 0 }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["preferences"]["per_page"], 50);

    let (status, body) = app.call(get("/api/preferences", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let prefs = &body["data"]["preferences"];
    assert_eq!(prefs["text_size"], "large");
    assert_eq!(prefs["show_cover"], false);

    let (status, body) = app
        .call(json_request("POST", "/api/preferences", Some(&cookie), json!({ "text_size": "huge" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid text size");
}

#[tokio::test]
async fn test_idle_session_is_rejected_and_removed() {
    let app = TestApp::new().await;
    let cookie = app.login(READER).await;
    let (status, _) = app.call(get("/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);

    sqlx::query("UPDATE Sessions SET last_seen = '2000-01-01 00:00:00'")
        .execute(&app.state.db)
        .await
        .unwrap();

    let (status, body) = app.call(get("/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], false);

    let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Sessions")
        .fetch_one(&app.state.db)
        .await
        .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn test_last_active_admin_cannot_be_demoted_or_disabled() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    let admin_id = user_id(&app, ADMIN).await;
    let uri = format!("/api/users/{}", admin_id);

    for change in [json!({ "role": "reader" }), json!({ "is_active": 0 })] {
        let (status, body) = app.call(json_request("PATCH", &uri, Some(&cookie), change)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Cannot disable the last active admin");
    }

    // Still an admin with a working session
    let (status, _) = app.call(get("/api/users", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_last_admin_cannot_be_deleted() {
    let app = TestApp::new().await;
    let admin = app.login(ADMIN).await;
    let (status, _) = app
        .call(json_request(
            "POST",
            "/api/users",
            Some(&admin),
            json!({ "username": "deputy", "password": "D3puty!Passw0rd#", "role": "admin" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app
        .send(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": "deputy", "password": "D3puty!Passw0rd#" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let deputy = session_cookie(&response).unwrap();

    // The deputy's row loses admin behind its open session's back
    sqlx::query("UPDATE Users SET role = 'reader' WHERE username = 'deputy'")
        .execute(&app.state.db)
        .await
        .unwrap();

    let admin_id = user_id(&app, ADMIN).await;
    let (status, body) = app
        .call(delete_request(&format!("/api/users/{}", admin_id), &deputy))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot delete the last admin");
    assert!(bookcat_server::db::users::find_by_id(&app.state.db, admin_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_disabling_user_ends_their_sessions() {
    let app = TestApp::new().await;
    let admin = app.login(ADMIN).await;
    let reader = app.login(READER).await;
    let reader_id = user_id(&app, READER).await;

    let (status, body) = app
        .call(json_request(
            "PATCH",
            &format!("/api/users/{}", reader_id),
            Some(&admin),
            json!({ "is_active": 0 }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], 0);

    let (status, _) = app.call(get("/api/me", Some(&reader))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": READER, "password": PASSWORD }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_change_applies_to_open_session() {
    let app = TestApp::new().await;
    let admin = app.login(ADMIN).await;
    let reader = app.login(READER).await;
    let reader_id = user_id(&app, READER).await;
    let uri = format!("/api/users/{}", reader_id);

    let (status, _) = app.call(get("/api/users", Some(&reader))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(json_request("PATCH", &uri, Some(&admin), json!({ "role": "admin" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "admin");

    let (status, _) = app.call(get("/api/users", Some(&reader))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(json_request("PATCH", &uri, Some(&admin), json!({ "role": "reader" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.call(get("/api/users", Some(&reader))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Admin required");
}
