//! Full catalog backup archive

use std::io::{Read, Write};
use std::path::Path;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use bookcat_common::text::{os_label, sanitize_filename};
use bookcat_common::SCHEMA_VERSION;
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::api::export::{timestamp, version_label, CheckQuery, Delivery};
use crate::api::run_blocking;
use crate::db::backup::{load_backup_data, BackupData, TableDump, BOOKS_HEADER};
use crate::error::{ApiError, ApiResult};
use crate::uploads::book_dir;
use crate::AppState;

const COPY_CHUNK: usize = 64 * 1024;

const README: &str = "BookCatalog - Full Backup\n\
Generated: {generated_at}\n\n\
Includes:\n\
- books.csv  (flat export; last column is cover_file)\n\
- authors.csv, publishers.csv, subjects.csv\n\
- Books_Authors.csv (with author_ord), Books_Subjects.csv\n\
- uploads/default-cover.jpg (if present)\n\
- uploads/<id>/cover.jpg for any book that has a cover\n\n\
Restore notes:\n\
- CSVs can be staged and merged with any SQL import pipeline.\n\
- Cover images mirror the web-relative layout under /uploads.\n";

fn table_csv(table: &TableDump) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.header)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV write failed: {}", e)))
}

fn meta_json(data: &BackupData, generated_at: &str) -> serde_json::Value {
    json!({
        "generated_at": generated_at,
        "counts": {
            "books": data.books.rows.len(),
            "authors": data.authors.rows.len(),
            "publishers": data.publishers.rows.len(),
            "subjects": data.subjects.rows.len(),
            "links": {
                "books_authors": data.books_authors.rows.len(),
                "books_subjects": data.books_subjects.rows.len(),
            },
        },
        "schema": {
            "version": SCHEMA_VERSION,
            "books": BOOKS_HEADER,
        },
    })
}

/// Archive writer that records a checksum for every payload file
struct ChecksummedZip {
    zip: ZipWriter<NamedTempFile>,
    options: SimpleFileOptions,
    sums: Vec<String>,
}

impl ChecksummedZip {
    fn new(out: NamedTempFile) -> Self {
        Self {
            zip: ZipWriter::new(out),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            sums: Vec::new(),
        }
    }

    fn add(&mut self, name: &str, bytes: &[u8], checksum: bool) -> ApiResult<()> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(bytes)?;
        if checksum {
            self.sums.push(format!("{:x}  {}", Sha256::digest(bytes), name));
        }
        Ok(())
    }

    /// Copy a file into the archive in chunks, hashing as it goes
    fn add_file_if_exists(&mut self, path: &Path, name: &str) -> ApiResult<()> {
        if !path.is_file() {
            return Ok(());
        }
        let mut source = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_CHUNK];
        self.zip.start_file(name, self.options)?;
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            self.zip.write_all(&buf[..n])?;
        }
        self.sums.push(format!("{:x}  {}", hasher.finalize(), name));
        Ok(())
    }

    fn finish(mut self) -> ApiResult<NamedTempFile> {
        let sums = format!("{}\n", self.sums.join("\n"));
        self.zip.start_file("sha256sums.txt", self.options)?;
        self.zip.write_all(sums.as_bytes())?;
        Ok(self.zip.finish()?)
    }
}

/// Build the archive into `out`: metadata, table dumps, covers and checksums
pub fn build_backup_archive(
    data: &BackupData,
    uploads_dir: &Path,
    out: NamedTempFile,
) -> ApiResult<NamedTempFile> {
    let generated_at = chrono::Local::now().to_rfc3339();
    let mut archive = ChecksummedZip::new(out);

    let meta = serde_json::to_vec_pretty(&meta_json(data, &generated_at))
        .map_err(|e| ApiError::Internal(format!("meta.json failed: {}", e)))?;
    archive.add("meta.json", &meta, false)?;
    archive.add("README.txt", README.replace("{generated_at}", &generated_at).as_bytes(), false)?;

    for table in data.tables() {
        archive.add(table.path, &table_csv(table)?, true)?;
    }

    archive.add_file_if_exists(&uploads_dir.join("default-cover.jpg"), "uploads/default-cover.jpg")?;
    for &book_id in &data.book_ids {
        archive.add_file_if_exists(
            &book_dir(uploads_dir, book_id).join("cover.jpg"),
            &format!("uploads/{}/cover.jpg", book_id),
        )?;
    }

    archive.finish()
}

/// GET /api/backup
pub async fn full_backup(State(state): State<AppState>, Query(query): Query<CheckQuery>) -> ApiResult<Response> {
    if query.check.as_deref() == Some("1") {
        return Ok(Delivery::check_response(&state)?.into_response());
    }
    let delivery = Delivery::for_state(&state)?;

    let data = load_backup_data(&state.db).await?;
    info!(
        "Building backup: {} books, {} authors",
        data.books.rows.len(),
        data.authors.rows.len()
    );
    let uploads = state.layout.uploads_dir();
    let staged = delivery.staging_file()?;
    let staged = run_blocking(move || build_backup_archive(&data, &uploads, staged)).await?;

    let filename = sanitize_filename(&format!(
        "bookcatalog_backup_{}_{}_{}.zip",
        timestamp(),
        os_label(),
        version_label()
    ));
    delivery
        .deliver_file("full", filename, "application/zip", staged)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BackupData {
        let table = |path: &'static str, header: &'static [&'static str], rows: Vec<Vec<String>>| TableDump {
            path,
            header,
            rows,
        };
        let mut book = vec![String::new(); BOOKS_HEADER.len()];
        book[0] = "5".into();
        book[1] = "Dune".into();
        BackupData {
            book_ids: vec![5, 6],
            books: table("data/books.csv", BOOKS_HEADER, vec![book]),
            authors: table("data/authors.csv", &["author_id", "first_name", "last_name", "sort_name"], vec![]),
            publishers: table("data/publishers.csv", &["publisher_id", "name"], vec![]),
            subjects: table("data/subjects.csv", &["subject_id", "name"], vec![]),
            books_authors: table("data/Books_Authors.csv", &["book_id", "author_id", "author_ord"], vec![]),
            books_subjects: table("data/Books_Subjects.csv", &["book_id", "subject_id"], vec![]),
        }
    }

    fn read_entry(zip: &mut zip::ZipArchive<std::fs::File>, name: &str) -> String {
        let mut content = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_backup_archive_layout() {
        let uploads = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(uploads.path().join("5")).unwrap();
        std::fs::write(uploads.path().join("5/cover.jpg"), b"cover-bytes").unwrap();

        let staged = build_backup_archive(&sample(), uploads.path(), NamedTempFile::new().unwrap()).unwrap();
        let mut zip = zip::ZipArchive::new(staged.reopen().unwrap()).unwrap();

        let meta: serde_json::Value = serde_json::from_str(&read_entry(&mut zip, "meta.json")).unwrap();
        assert_eq!(meta["counts"]["books"], 1);
        assert_eq!(meta["schema"]["version"], SCHEMA_VERSION);

        let books = read_entry(&mut zip, "data/books.csv");
        assert!(books.starts_with("id,title,"));
        assert!(books.contains("5,Dune,"));

        assert_eq!(read_entry(&mut zip, "uploads/5/cover.jpg"), "cover-bytes");
        assert!(zip.by_name("uploads/6/cover.jpg").is_err());
        assert!(zip.by_name("uploads/default-cover.jpg").is_err());

        let sums = read_entry(&mut zip, "sha256sums.txt");
        let expected = format!("{:x}  uploads/5/cover.jpg", Sha256::digest(b"cover-bytes"));
        assert!(sums.lines().any(|l| l == expected));
        assert_eq!(sums.lines().count(), 7);
        assert!(!sums.contains("meta.json"));
    }

    #[test]
    fn test_large_cover_is_copied_and_hashed_whole() {
        let uploads = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(uploads.path().join("6")).unwrap();
        let cover: Vec<u8> = (0..(COPY_CHUNK * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(uploads.path().join("6/cover.jpg"), &cover).unwrap();

        let staged = build_backup_archive(&sample(), uploads.path(), NamedTempFile::new().unwrap()).unwrap();
        let mut zip = zip::ZipArchive::new(staged.reopen().unwrap()).unwrap();

        let mut copied = Vec::new();
        zip.by_name("uploads/6/cover.jpg").unwrap().read_to_end(&mut copied).unwrap();
        assert_eq!(copied, cover);

        let sums = read_entry(&mut zip, "sha256sums.txt");
        let expected = format!("{:x}  uploads/6/cover.jpg", Sha256::digest(&cover));
        assert!(sums.lines().any(|l| l == expected));
    }
}
