//! CSV import endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::csv_import::{self, ImportRow, RowOutcome, FORMAT_NOTE};
use crate::db::authors::attach_authors;
use crate::db::books::{self, NewBook};
use crate::db::lookups::{attach_subjects, get_or_create_by_name, get_or_create_placement, NameTable};
use crate::error::{ApiError, ApiResult};
use crate::fields::FormData;
use crate::uploads::relative_cover_path;
use crate::AppState;

const MAX_ERRORS: usize = 25;
const MAX_ID_CONFLICTS: usize = 200;

#[derive(Debug, Serialize)]
struct LineError {
    line: usize,
    error: String,
}

/// An explicit id that was taken, and the id the row received instead
#[derive(Debug, Serialize)]
struct IdConflict {
    line: usize,
    existing_id: i64,
    new_id: i64,
    title: String,
    authors: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct ImportSummary {
    dry_run: bool,
    total: usize,
    inserted: usize,
    skipped: usize,
    errors: Vec<LineError>,
    id_conflicts: Vec<IdConflict>,
    note: &'static str,
}

impl ImportSummary {
    fn push_error(&mut self, line: usize, error: String) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(LineError { line, error });
        }
    }
}

/// Present, non-empty and not `"0"`
fn dry_run_requested(form: &FormData) -> bool {
    form.fields
        .text("dry_run")
        .is_some_and(|v| !v.trim().is_empty() && v.trim() != "0")
}

/// Insert one parsed row with its links; returns the id it received and
/// whether its explicit id was already taken
async fn insert_row(conn: &mut SqliteConnection, row: &ImportRow) -> bookcat_common::Result<(i64, bool)> {
    let id_conflict = match row.id {
        Some(id) => books::book_exists(conn, id).await?,
        None => false,
    };

    let publisher_id = match &row.publisher {
        Some(name) => get_or_create_by_name(conn, NameTable::Publishers, name).await?,
        None => None,
    };
    let placement_id = match row.placement {
        Some((bookcase, shelf)) => get_or_create_placement(conn, bookcase, shelf).await?,
        None => None,
    };

    let new_book = NewBook {
        book_id: if id_conflict { None } else { row.id },
        title: row.title.clone(),
        subtitle: row.subtitle.clone(),
        series: row.series.clone(),
        publisher_id,
        year_published: row.year,
        isbn: row.isbn.clone(),
        lccn: row.lccn.clone(),
        notes: row.notes.clone(),
        loaned_to: row.loaned_to.clone(),
        loaned_date: row.loaned_date.clone(),
        placement_id,
        ..NewBook::default()
    };
    let book_id = books::insert_book(conn, &new_book).await?;

    if let Some(authors) = &row.authors {
        attach_authors(conn, book_id, authors, None).await?;
    }
    if let Some(subjects) = &row.subjects {
        attach_subjects(conn, book_id, subjects).await?;
    }
    if let Some(file) = &row.cover_filename {
        let rel = relative_cover_path(book_id, file);
        books::set_cover(conn, book_id, Some(&rel), Some(&rel)).await?;
    }

    Ok((book_id, id_conflict))
}

/// POST /api/import/csv
///
/// Each row is written in its own transaction; a failing row is reported
/// and the rest of the file continues. A dry run parses and validates only.
pub async fn import_csv(State(state): State<AppState>, form: FormData) -> ApiResult<Json<Value>> {
    let file = form
        .file("file")
        .ok_or_else(|| ApiError::bad_request("No file uploaded or upload error"))?;
    let dry_run = dry_run_requested(&form);
    let content = String::from_utf8_lossy(&file.bytes);
    let parsed = csv_import::parse(&content);
    info!(
        "CSV import: {} rows, layout {:?}, header {}, dry run {}",
        parsed.rows.len(),
        parsed.layout,
        parsed.has_header,
        dry_run
    );

    let mut summary = ImportSummary {
        dry_run,
        total: parsed.rows.len(),
        note: FORMAT_NOTE,
        ..ImportSummary::default()
    };

    for outcome in parsed.rows {
        let (line, row) = match outcome {
            RowOutcome::Skipped { line, error } => {
                summary.skipped += 1;
                summary.push_error(line, error);
                continue;
            }
            RowOutcome::Row { line, row } => (line, row),
        };
        if dry_run {
            continue;
        }

        let mut tx = state.db.begin().await?;
        match insert_row(&mut tx, &row).await {
            Ok((book_id, id_conflict)) => {
                tx.commit().await?;
                summary.inserted += 1;
                if let (true, Some(existing_id)) = (id_conflict, row.id) {
                    if summary.id_conflicts.len() < MAX_ID_CONFLICTS {
                        summary.id_conflicts.push(IdConflict {
                            line,
                            existing_id,
                            new_id: book_id,
                            title: row.title,
                            authors: row.authors,
                        });
                    }
                }
            }
            Err(e) => {
                warn!("CSV import line {} failed: {}", line, e);
                tx.rollback().await?;
                summary.push_error(line, e.to_string());
            }
        }
    }

    info!(
        "CSV import finished: {} inserted, {} skipped, {} id conflicts",
        summary.inserted,
        summary.skipped,
        summary.id_conflicts.len()
    );
    Ok(Json(json!({ "ok": true, "data": summary })))
}
