//! Integration tests for CSV import, exports and the full backup

mod helpers;

use std::io::{Cursor, Read};

use axum::http::{header, StatusCode};
use helpers::{get, json_request, multipart_request, TestApp, ADMIN, READER};
use serde_json::json;

const EXPORT_CSV: &str = "\
ID,Title,Subtitle,Series,Year,ISBN,LCCN,Notes,Publisher,Authors,Subjects,Loaned To,Loaned Date,Bookcase,Shelf,Cover Image,Cover Filename
1,The Dispossessed,An Ambiguous Utopia,Hainish Cycle,1974,0060125632,,,Harper & Row,Ursula K. Le Guin,Science Fiction,,,4,1,,
77,A Wizard of Earthsea,,Earthsea,1968,,,,Parnassus,Ursula K. Le Guin,Fantasy,Ann,2024-03-01,4,2,,
78,,No title here,,,,,,,,,,,,,,
79,Bad Loan,,,,,,,,,,Bob,yesterday,,,,
";

async fn create_book(app: &TestApp, cookie: &str, title: &str) -> i64 {
    let (status, body) = app
        .call(json_request("POST", "/api/books", Some(cookie), json!({ "title": title })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_import_requires_file() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;

    let (status, body) = app
        .call(json_request("POST", "/api/import/csv", Some(&cookie), json!({ "dry_run": 1 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded or upload error");
}

#[tokio::test]
async fn test_import_dry_run_writes_nothing() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;

    let (status, body) = app
        .call(multipart_request(
            "/api/import/csv",
            &cookie,
            &[("dry_run", "1")],
            ("file", "books.csv", EXPORT_CSV.as_bytes()),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let summary = &body["data"];
    assert_eq!(summary["dry_run"], true);
    assert_eq!(summary["total"], 4);
    assert_eq!(summary["inserted"], 0);
    assert_eq!(summary["skipped"], 2);
    assert_eq!(summary["errors"].as_array().unwrap().len(), 2);

    let (_, body) = app.call(get("/api/books", Some(&cookie))).await;
    assert_eq!(body["meta"]["total"], 0);
}

#[tokio::test]
async fn test_import_reassigns_taken_ids() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    let existing = create_book(&app, &cookie, "Already Here").await;
    assert_eq!(existing, 1);

    let (status, body) = app
        .call(multipart_request(
            "/api/import/csv",
            &cookie,
            &[],
            ("file", "books.csv", EXPORT_CSV.as_bytes()),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let summary = &body["data"];
    assert_eq!(summary["dry_run"], false);
    assert_eq!(summary["inserted"], 2);
    assert_eq!(summary["skipped"], 2);

    let conflicts = summary["id_conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["existing_id"], 1);
    assert_eq!(conflicts[0]["title"], "The Dispossessed");
    let new_id = conflicts[0]["new_id"].as_i64().unwrap();
    assert_ne!(new_id, 1);

    // Free ids are kept as given
    let (status, body) = app.call(get("/api/books/77", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "A Wizard of Earthsea");
    assert_eq!(body["data"]["loaned_to"], "Ann");
    assert_eq!(body["data"]["bookcase_no"], 4);

    let (_, body) = app.call(get(&format!("/api/books/{}", new_id), Some(&cookie))).await;
    assert_eq!(body["data"]["subtitle"], "An Ambiguous Utopia");
    assert_eq!(body["data"]["publisher"], "Harper & Row");
}

#[tokio::test]
async fn test_import_legacy_layout() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    let legacy = "Solaris;;1961;Stanisław Lem\nFiasco;;1986;Stanisław Lem\n";

    let (status, body) = app
        .call(multipart_request(
            "/api/import/csv",
            &cookie,
            &[],
            ("file", "legacy.csv", legacy.as_bytes()),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["inserted"], 2);

    let (_, body) = app.call(get("/api/books?q=Lem", Some(&cookie))).await;
    assert_eq!(body["meta"]["total"], 2);
}

#[tokio::test]
async fn test_export_books_csv_streams() {
    let app = TestApp::new().await;
    let cookie = app.login(READER).await;
    let admin = app.login(ADMIN).await;
    create_book(&app, &admin, "Kindred").await;
    create_book(&app, &admin, "Beloved").await;

    let (status, body) = app.call(get("/api/export/books.csv?check=1", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "stream");

    let response = app.send(get("/api/export/books.csv", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("export_2_books_"));
    assert!(disposition.contains(".csv"));

    let text = helpers::extract_text(response).await;
    let mut reader = csv::Reader::from_reader(text.trim_start_matches('\u{FEFF}').as_bytes());
    assert_eq!(&reader.headers().unwrap()[1], "Title");
    let titles: Vec<String> = reader.records().map(|r| r.unwrap()[1].to_string()).collect();
    assert_eq!(titles, vec!["Beloved", "Kindred"]);
}

#[tokio::test]
async fn test_export_books_json() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    create_book(&app, &cookie, "Kindred").await;

    let (status, body) = app.call(get("/api/export/books.json?q=kind", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["title"], "Kindred");
    assert!(body["data"][0]["cover_filename"].is_null());
}

#[tokio::test]
async fn test_backup_to_server_directory() {
    let backup_dir = tempfile::tempdir().unwrap();
    let app = TestApp::with_backup_dir(Some(backup_dir.path().display().to_string())).await;
    let cookie = app.login(ADMIN).await;
    create_book(&app, &cookie, "Kindred").await;

    let (status, body) = app.call(get("/api/backup?check=1", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "server");

    let (status, body) = app.call(get("/api/backup", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let filename = body["filename"].as_str().unwrap();
    assert!(filename.starts_with("bookcatalog_backup_"));
    assert!(filename.ends_with(".zip"));

    let bytes = std::fs::read(backup_dir.path().join(filename)).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert!(names.contains(&"meta.json".to_string()));
    assert!(names.contains(&"sha256sums.txt".to_string()));

    let mut meta = String::new();
    archive.by_name("meta.json").unwrap().read_to_string(&mut meta).unwrap();
    let meta: serde_json::Value = serde_json::from_str(&meta).unwrap();
    assert_eq!(meta["counts"]["books"], 1);
}

#[tokio::test]
async fn test_backup_refuses_unusable_directory() {
    let missing = tempfile::tempdir().unwrap().path().join("not-there");
    let app = TestApp::with_backup_dir(Some(missing.display().to_string())).await;
    let cookie = app.login(ADMIN).await;

    let (status, body) = app.call(get("/api/backup?check=1", Some(&cookie))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], false);

    let (status, body) = app.call(get("/api/admin/warnings", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["backup_dir"], "missing");
    assert_eq!(body["data"]["warnings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_covers_zip_readme_only_when_empty() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;

    let response = app.send(get("/api/export/covers.zip", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert_eq!(names, vec!["README.txt"]);
}

#[tokio::test]
async fn test_covers_zip_to_server_directory_leaves_no_staging_file() {
    let backup_dir = tempfile::tempdir().unwrap();
    let app = TestApp::with_backup_dir(Some(backup_dir.path().display().to_string())).await;
    let cookie = app.login(ADMIN).await;
    let cover_dir = app.root.path().join("uploads/3");
    std::fs::create_dir_all(&cover_dir).unwrap();
    std::fs::write(cover_dir.join("cover.jpg"), b"jpeg-bytes").unwrap();

    let (status, body) = app.call(get("/api/export/covers.zip", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "server");
    let filename = body["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("export_1_covers_"));

    let names: Vec<String> = std::fs::read_dir(backup_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![filename.clone()]);

    let file = std::fs::File::open(backup_dir.path().join(&filename)).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut cover = String::new();
    archive.by_name("uploads/3/cover.jpg").unwrap().read_to_string(&mut cover).unwrap();
    assert_eq!(cover, "jpeg-bytes");
}

#[tokio::test]
async fn test_backup_download_streams_archive() {
    let app = TestApp::new().await;
    let cookie = app.login(ADMIN).await;
    create_book(&app, &cookie, "Kindred").await;

    let response = app.send(get("/api/backup", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    let length: usize = response.headers()[header::CONTENT_LENGTH].to_str().unwrap().parse().unwrap();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.len(), length);
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut books = String::new();
    archive.by_name("data/books.csv").unwrap().read_to_string(&mut books).unwrap();
    assert!(books.contains("Kindred"));
}
