//! Book and cover exports
//!
//! When a backup directory is configured and usable, exports are written
//! there and the response names the file. Without one they download as
//! attachments. A configured but unusable directory fails the request.

use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bookcat_common::config::BackupDirStatus;
use bookcat_common::text::{os_label, sanitize_filename};
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::api::run_blocking;
use crate::db::books::{self, BookFilter, BookRow};
use crate::db::SortDir;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const CSV_HEADER: [&str; 17] = [
    "ID",
    "Title",
    "Subtitle",
    "Series",
    "Year",
    "ISBN",
    "LCCN",
    "Notes",
    "Publisher",
    "Authors",
    "Subjects",
    "Loaned To",
    "Loaned Date",
    "Bookcase",
    "Shelf",
    "Cover Image",
    "Cover Filename",
];

/// Where a finished export goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    Download,
    Server(PathBuf),
}

/// Read size for streaming a staged archive back to the client
const STREAM_CHUNK: usize = 64 * 1024;

impl Delivery {
    /// Pick the delivery mode; an unusable backup directory is an error
    pub(crate) fn for_state(state: &AppState) -> ApiResult<Self> {
        let status = BackupDirStatus::inspect(state.backup_dir.as_deref());
        match status {
            BackupDirStatus::Disabled => Ok(Self::Download),
            BackupDirStatus::Ready(dir) => Ok(Self::Server(dir)),
            other => Err(ApiError::Internal(
                other.error_message().unwrap_or_else(|| "Backup directory unavailable".to_string()),
            )),
        }
    }

    /// Answer for `?check=1`
    pub(crate) fn check_response(state: &AppState) -> ApiResult<Json<Value>> {
        Ok(Json(match Self::for_state(state)? {
            Self::Download => json!({ "ok": true, "mode": "stream" }),
            Self::Server(dir) => json!({ "ok": true, "mode": "server", "dir": dir.display().to_string() }),
        }))
    }

    /// Temp file an archive is built in
    ///
    /// Server mode stages inside the backup directory so the final
    /// persist is a rename on the same filesystem.
    pub(crate) fn staging_file(&self) -> ApiResult<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".bookcat-").suffix(".part");
        Ok(match self {
            Self::Server(dir) => builder.tempfile_in(dir)?,
            Self::Download => builder.tempfile()?,
        })
    }

    fn saved_response(dir: &Path, filename: String, path: &Path) -> Response {
        Json(json!({
            "ok": true,
            "mode": "server",
            "dir": dir.display().to_string(),
            "filename": filename,
            "path": path.display().to_string(),
        }))
        .into_response()
    }

    fn download_response(filename: &str, content_type: &'static str, size: u64, body: Body) -> Response {
        (
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
            body,
        )
            .into_response()
    }

    /// Write the finished bytes to the backup directory or hand them back as a download
    pub(crate) async fn deliver(
        self,
        kind: &str,
        filename: String,
        content_type: &'static str,
        bytes: Vec<u8>,
    ) -> ApiResult<Response> {
        let size = bytes.len() as u64;
        match self {
            Self::Server(dir) => {
                let path = dir.join(&filename);
                tokio::fs::write(&path, &bytes).await?;
                info!(
                    "Backup completed: type={} mode=server file={} size={} bytes",
                    kind, filename, size
                );
                Ok(Self::saved_response(&dir, filename, &path))
            }
            Self::Download => {
                info!(
                    "Backup completed: type={} mode=download file={} size={} bytes",
                    kind, filename, size
                );
                Ok(Self::download_response(&filename, content_type, size, Body::from(bytes)))
            }
        }
    }

    /// Move a staged archive into the backup directory or stream it back as a download
    ///
    /// The temp file is unlinked either way; a download keeps reading
    /// from the open handle until the body is done.
    pub(crate) async fn deliver_file(
        self,
        kind: &str,
        filename: String,
        content_type: &'static str,
        staged: NamedTempFile,
    ) -> ApiResult<Response> {
        let size = staged.as_file().metadata()?.len();
        match self {
            Self::Server(dir) => {
                let path = dir.join(&filename);
                let target = path.clone();
                run_blocking(move || {
                    staged.persist(&target).map_err(|e| ApiError::Io(e.error))?;
                    Ok(())
                })
                .await?;
                info!(
                    "Backup completed: type={} mode=server file={} size={} bytes",
                    kind, filename, size
                );
                Ok(Self::saved_response(&dir, filename, &path))
            }
            Self::Download => {
                let mut file = staged.into_file();
                file.seek(SeekFrom::Start(0))?;
                info!(
                    "Backup completed: type={} mode=download file={} size={} bytes",
                    kind, filename, size
                );
                Ok(Self::download_response(&filename, content_type, size, file_body(file)))
            }
        }
    }
}

/// Response body that reads `file` to the end in chunks
fn file_body(file: std::fs::File) -> Body {
    let mut file = tokio::fs::File::from_std(file);
    let stream = async_stream::stream! {
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => yield Ok::<_, std::io::Error>(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => {
                    warn!("Download stream failed: {}", e);
                    yield Err(e);
                    break;
                }
            }
        }
    };
    Body::from_stream(stream)
}

/// `Ymd_His` in local time
pub(crate) fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// `v<crate version>`
pub(crate) fn version_label() -> String {
    format!("v{}", env!("CARGO_PKG_VERSION"))
}

pub(crate) fn books_csv_filename(total: i64, timestamp: &str) -> String {
    sanitize_filename(&format!(
        "export_{}_books_{}_{}_sqlite_{}.csv",
        total,
        timestamp,
        os_label(),
        version_label()
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub q: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub check: Option<String>,
}

impl ExportQuery {
    fn check_mode(&self) -> bool {
        self.check.as_deref() == Some("1")
    }

    async fn rows(&self, state: &AppState) -> ApiResult<Vec<BookRow>> {
        let filter = BookFilter::for_export(self.q.as_deref().map(str::trim).unwrap_or(""));
        let sort = self.sort.as_deref().unwrap_or("title").to_ascii_lowercase();
        let dir = SortDir::parse(self.dir.as_deref(), SortDir::Asc);
        Ok(books::export_books(&state.db, &filter, &sort, dir).await?)
    }
}

fn opt_int(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render the export CSV
pub fn books_to_csv(rows: &[BookRow]) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        let cover_filename = row.cover_filename().unwrap_or_default();
        writer.write_record([
            row.id.to_string(),
            row.title.clone(),
            row.subtitle.clone().unwrap_or_default(),
            row.series.clone().unwrap_or_default(),
            opt_int(row.year_published),
            row.isbn.clone().unwrap_or_default(),
            row.lccn.clone().unwrap_or_default(),
            row.notes.clone().unwrap_or_default(),
            row.publisher.clone().unwrap_or_default(),
            row.authors.clone().unwrap_or_default(),
            row.subjects.clone().unwrap_or_default(),
            row.loaned_to.clone().unwrap_or_default(),
            row.loaned_date.clone().unwrap_or_default(),
            opt_int(row.bookcase_no),
            opt_int(row.shelf_no),
            row.cover_image.clone().unwrap_or_default(),
            cover_filename,
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV write failed: {}", e)))
}

/// GET /api/export/books.csv
pub async fn export_books_csv(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    if query.check_mode() {
        return Ok(Delivery::check_response(&state)?.into_response());
    }
    let delivery = Delivery::for_state(&state)?;

    let total = books::count_books(&state.db, &BookFilter::default()).await?;
    let rows = query.rows(&state).await?;
    let bytes = books_to_csv(&rows)?;
    let filename = books_csv_filename(total, &timestamp());

    delivery
        .deliver("csv", filename, "text/csv; charset=utf-8", bytes)
        .await
}

/// GET /api/export/books.json
pub async fn export_books_json(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Json<Value>> {
    let rows = query.rows(&state).await?;
    let total = rows.len();
    let data: Vec<Value> = rows
        .into_iter()
        .map(|row| {
            let cover_filename = row.cover_filename();
            let mut value = json!(row);
            if let Some(obj) = value.as_object_mut() {
                obj.insert("cover_filename".to_string(), json!(cover_filename));
            }
            value
        })
        .collect();

    Ok(Json(json!({ "ok": true, "data": data, "meta": { "total": total } })))
}

/// Archive of the uploads tree, staged on disk
#[derive(Debug)]
pub struct CoversArchive {
    pub file: NamedTempFile,
    pub file_count: usize,
    pub errors: Vec<String>,
}

fn covers_readme(generated_at: &str) -> String {
    format!(
        "BookCatalog - Covers Backup\n\
         Generated: {}\n\n\
         Includes:\n\
         - uploads/ (all files, preserving directory structure)\n\n\
         Notes:\n\
         - skipped files may indicate permission issues\n",
        generated_at
    )
}

/// Add every file below `uploads_dir` as `uploads/<rel>`; returns files added
fn add_uploads_tree<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    uploads_dir: &Path,
    errors: &mut Vec<String>,
) -> ApiResult<usize> {
    if !uploads_dir.is_dir() {
        errors.push("uploads directory is missing or not readable".to_string());
        return Ok(0);
    }
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut added = 0;
    for entry in WalkDir::new(uploads_dir).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                errors.push(format!("uploads scan failed: {}", e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(uploads_dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        match std::fs::File::open(entry.path()) {
            Ok(mut source) => {
                zip.start_file(format!("uploads/{}", rel), options)?;
                std::io::copy(&mut source, zip)?;
                added += 1;
            }
            Err(e) => errors.push(format!("zip add failed: {} ({})", rel, e)),
        }
    }
    Ok(added)
}

/// Zip the uploads tree into `out` with a README and, when files failed, `errors.txt`
pub fn build_covers_archive(uploads_dir: &Path, out: NamedTempFile) -> ApiResult<CoversArchive> {
    let mut zip = ZipWriter::new(out);
    let mut errors = Vec::new();
    let file_count = add_uploads_tree(&mut zip, uploads_dir, &mut errors)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("README.txt", options)?;
    zip.write_all(covers_readme(&chrono::Local::now().to_rfc3339()).as_bytes())?;
    if !errors.is_empty() {
        for error in &errors {
            warn!("Covers export: {}", error);
        }
        zip.start_file("errors.txt", options)?;
        zip.write_all(format!("{}\n", errors.join("\n")).as_bytes())?;
    }

    let file = zip.finish()?;
    Ok(CoversArchive {
        file,
        file_count,
        errors,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    pub check: Option<String>,
}

/// GET /api/export/covers.zip
pub async fn export_covers_zip(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> ApiResult<Response> {
    if query.check.as_deref() == Some("1") {
        return Ok(Delivery::check_response(&state)?.into_response());
    }
    let delivery = Delivery::for_state(&state)?;

    let uploads = state.layout.uploads_dir();
    let staged = delivery.staging_file()?;
    let archive = run_blocking(move || build_covers_archive(&uploads, staged)).await?;
    let filename = sanitize_filename(&format!(
        "export_{}_covers_{}_{}_{}.zip",
        archive.file_count,
        timestamp(),
        os_label(),
        version_label()
    ));

    delivery
        .deliver_file("covers", filename, "application/zip", archive.file)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn book(id: i64, title: &str) -> BookRow {
        BookRow {
            id,
            title: title.to_string(),
            subtitle: None,
            series: None,
            year_published: Some(1965),
            isbn: None,
            lccn: None,
            notes: Some("first, \"quoted\"".to_string()),
            cover_image: Some(format!("uploads/{}/cover.jpg", id)),
            cover_thumb: None,
            has_cover: 1,
            loaned_to: None,
            loaned_date: None,
            loan_status: "In collection".to_string(),
            publisher: Some("Chilton".to_string()),
            publisher_id: Some(1),
            placement_id: None,
            bookcase_no: Some(2),
            shelf_no: Some(3),
            authors: Some("Frank Herbert".to_string()),
            authors_hu: Some("No".to_string()),
            authors_hu_flag: Some(0),
            subjects: None,
        }
    }

    #[test]
    fn test_books_to_csv() {
        let bytes = books_to_csv(&[book(7, "Dune")]).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), CSV_HEADER.len());
        assert_eq!(&headers[16], "Cover Filename");

        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "7");
        assert_eq!(&record[4], "1965");
        assert_eq!(&record[7], "first, \"quoted\"");
        assert_eq!(&record[13], "2");
        assert_eq!(&record[15], "uploads/7/cover.jpg");
        assert_eq!(&record[16], "cover.jpg");
    }

    #[test]
    fn test_books_csv_filename_is_sanitized() {
        let name = books_csv_filename(12, "20240101_120000");
        assert!(name.starts_with("export_12_books_20240101_120000_"));
        assert!(name.ends_with(".csv"));
        assert!(name.contains("_sqlite_v"));
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')));
    }

    #[test]
    fn test_covers_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("5")).unwrap();
        std::fs::write(dir.path().join("5/cover.jpg"), b"jpeg").unwrap();
        std::fs::write(dir.path().join("default-cover.jpg"), b"default").unwrap();

        let archive = build_covers_archive(dir.path(), NamedTempFile::new().unwrap()).unwrap();
        assert_eq!(archive.file_count, 2);
        assert!(archive.errors.is_empty());

        let mut zip = zip::ZipArchive::new(archive.file.reopen().unwrap()).unwrap();
        let mut content = String::new();
        zip.by_name("uploads/5/cover.jpg").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "jpeg");
        assert!(zip.by_name("README.txt").is_ok());
        assert!(zip.by_name("errors.txt").is_err());
    }

    #[test]
    fn test_covers_archive_without_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let archive =
            build_covers_archive(&dir.path().join("missing"), NamedTempFile::new().unwrap()).unwrap();
        assert_eq!(archive.file_count, 0);
        assert_eq!(archive.errors.len(), 1);

        let mut zip = zip::ZipArchive::new(archive.file.reopen().unwrap()).unwrap();
        assert!(zip.by_name("errors.txt").is_ok());
    }

    #[test]
    fn test_staging_file_lives_in_backup_dir() {
        let dir = tempfile::tempdir().unwrap();
        let staged = Delivery::Server(dir.path().to_path_buf()).staging_file().unwrap();
        assert_eq!(staged.path().parent().unwrap(), dir.path());
        let name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".bookcat-"));
        assert!(name.ends_with(".part"));

        drop(staged);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_deliver_file_persists_into_backup_dir() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = Delivery::Server(dir.path().to_path_buf());
        let mut staged = delivery.staging_file().unwrap();
        staged.write_all(b"archive").unwrap();

        let response = delivery
            .deliver_file("covers", "covers.zip".to_string(), "application/zip", staged)
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["covers.zip"]);
        assert_eq!(std::fs::read(dir.path().join("covers.zip")).unwrap(), b"archive");
    }

    #[tokio::test]
    async fn test_deliver_file_streams_download_from_start() {
        let mut staged = NamedTempFile::new().unwrap();
        staged.write_all(b"streamed archive").unwrap();
        let path = staged.path().to_path_buf();

        let response = Delivery::Download
            .deliver_file("covers", "covers.zip".to_string(), "application/zip", staged)
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "16");
        assert!(!path.exists());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"streamed archive");
    }
}
