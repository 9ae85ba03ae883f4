//! Integration tests for cover uploads and the cover maintenance routes

mod helpers;

use std::io::Cursor;

use axum::http::StatusCode;
use helpers::{get, json_request, multipart_request, TestApp, ADMIN, READER};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 40])));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

fn png(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Png)
}

async fn create_book(app: &TestApp, cookie: &str, title: &str) -> i64 {
    let (status, body) = app
        .call(json_request("POST", "/api/books", Some(cookie), json!({ "title": title })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_i64().unwrap()
}

async fn stored_cover(app: &TestApp, book_id: i64) -> (Option<String>, Option<String>) {
    sqlx::query_as("SELECT cover_image, cover_thumb FROM Books WHERE book_id = ?")
        .bind(book_id)
        .fetch_one(&app.state.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cover_upload_for_missing_book() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    let image = png(40, 60);

    let (status, body) = app
        .call(multipart_request(
            "/api/covers",
            &cookie,
            &[("book_id", "999")],
            ("image", "cover.png", image.as_slice()),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Book not found");
    assert!(!app.root.path().join("uploads/999").exists());
}

#[tokio::test]
async fn test_cover_upload_rejects_non_images() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    let book_id = create_book(&app, &cookie, "Kindred").await;

    let (status, _) = app
        .call(multipart_request(
            "/api/covers",
            &cookie,
            &[("book_id", book_id.to_string().as_str())],
            ("image", "cover.png", b"%PDF-1.4 not an image".as_slice()),
        ))
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let reader = app.login(READER).await;
    let (status, _) = app
        .call(multipart_request(
            "/api/covers",
            &reader,
            &[("book_id", book_id.to_string().as_str())],
            ("image", "cover.png", png(40, 60).as_slice()),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cover_upload_stores_files_and_paths() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    let book_id = create_book(&app, &cookie, "Kindred").await;

    let (status, body) = app
        .call(multipart_request(
            "/api/covers",
            &cookie,
            &[("book_id", book_id.to_string().as_str())],
            ("image", "scan.png", png(400, 600).as_slice()),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let cover = format!("uploads/{}/cover.png", book_id);
    let thumb = format!("uploads/{}/cover-thumb.png", book_id);
    assert_eq!(body["data"]["affected_rows"], 1);
    assert_eq!(body["data"]["path"], cover.as_str());
    assert_eq!(body["data"]["thumb"], thumb.as_str());

    let root = app.root.path();
    assert!(root.join(&cover).is_file());
    let thumb_image = image::open(root.join(&thumb)).unwrap();
    assert_eq!(thumb_image.width(), 200);
    assert_eq!(thumb_image.height(), 300);

    assert_eq!(stored_cover(&app, book_id).await, (Some(cover.clone()), Some(thumb.clone())));

    let (_, body) = app.call(get(&format!("/api/books/{}", book_id), Some(&cookie))).await;
    assert_eq!(body["data"]["cover_image"], cover.as_str());

    // A new upload replaces the old files
    let (status, _) = app
        .call(multipart_request(
            "/api/covers",
            &cookie,
            &[("book_id", book_id.to_string().as_str())],
            ("image", "scan.jpg", encoded(100, 150, ImageFormat::Jpeg).as_slice()),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!root.join(&cover).exists());
    assert!(root.join(format!("uploads/{}/cover.jpg", book_id)).is_file());
}

#[tokio::test]
async fn test_maintenance_routes_rebuild_and_normalize() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    let book_id = create_book(&app, &cookie, "Kindred").await;
    let (status, _) = app
        .call(multipart_request(
            "/api/covers",
            &cookie,
            &[("book_id", book_id.to_string().as_str())],
            ("image", "scan.png", png(400, 600).as_slice()),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Existing thumbs are left alone without `re`
    let (status, body) = app
        .call(json_request("POST", "/api/maintenance/rebuild_thumbs", Some(&cookie), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["scanned"], 1);
    assert_eq!(body["data"]["updated"], 0);
    assert_eq!(body["data"]["skipped"], 1);

    let (status, body) = app
        .call(json_request(
            "POST",
            "/api/maintenance/rebuild_thumbs?re=1&h=120",
            Some(&cookie),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 1);
    let thumb = app.root.path().join(format!("uploads/{}/cover-thumb.png", book_id));
    assert_eq!(image::open(&thumb).unwrap().height(), 120);

    // Leave a legacy file for normalize to tidy up
    std::fs::write(
        app.root.path().join(format!("uploads/{}/cover-thumb-2019.png", book_id)),
        b"old",
    )
    .unwrap();

    let (status, body) = app
        .call(json_request("POST", "/api/maintenance/normalize_covers?dry=1", Some(&cookie), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dry_run"], true);
    assert_eq!(body["data"]["db_rows_would_update"], 1);
    assert_eq!(body["data"]["db_rows_updated"], 0);

    let (status, body) = app
        .call(json_request("POST", "/api/maintenance/normalize_covers", Some(&cookie), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dry_run"], false);
    assert_eq!(body["data"]["deleted_legacy"], 1);
    assert_eq!(body["data"]["db_rows_updated"], 1);
    assert!(body["data"]["db_rows_would_update"].is_null());

    let (cover_image, cover_thumb) = stored_cover(&app, book_id).await;
    assert_eq!(cover_image, Some(format!("uploads/{}/cover.png", book_id)));
    assert_eq!(cover_thumb, Some(format!("uploads/{}/cover-thumb.png", book_id)));

    let reader = app.login(READER).await;
    let (status, _) = app
        .call(json_request("POST", "/api/maintenance/normalize_covers", Some(&reader), json!({})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
