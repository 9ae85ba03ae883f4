//! Book list, detail and edit endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bookcat_common::text::{is_iso_date, normalize};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::api::covers::{store_cover, validate_cover};
use crate::api::run_blocking;
use crate::db::authors::{attach_authors, set_hungarian_for_book};
use crate::db::books::{self, BookFilter, ColumnValue, NewBook};
use crate::db::lookups::{attach_subjects, get_or_create_by_name, get_or_create_placement, NameTable};
use crate::db::SortDir;
use crate::error::{ApiError, ApiResult};
use crate::fields::{parse_int, Fields, FormData};
use crate::pagination::{calculate_pagination, BOOK_PAGES};
use crate::uploads::{book_dir, relative_cover_path};
use crate::AppState;

const INVALID_LOANED_DATE: &str = "Invalid loaned_date (expected YYYY-MM-DD)";

/// Scalar columns a book update may set directly
const UPDATABLE_TEXT: [&str; 8] = [
    "title",
    "subtitle",
    "series",
    "isbn",
    "lccn",
    "notes",
    "loaned_to",
    "loaned_date",
];

#[derive(Debug, Default, Deserialize)]
pub struct BooksQuery {
    pub q: Option<String>,
    pub page: Option<String>,
    pub per: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
}

/// GET /api/books
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BooksQuery>,
) -> ApiResult<Json<Value>> {
    let pagination = calculate_pagination(
        query.page.as_deref().and_then(parse_int),
        query.per.as_deref().and_then(parse_int),
        BOOK_PAGES,
    );
    let filter = BookFilter::for_list(query.q.as_deref().unwrap_or(""));
    let sort = query.sort.as_deref().unwrap_or("id").to_ascii_lowercase();
    let dir = SortDir::parse(query.dir.as_deref(), SortDir::Desc);

    let total = books::count_books(&state.db, &filter).await?;
    let rows = books::list_books(&state.db, &filter, &sort, dir, pagination).await?;

    Ok(Json(json!({
        "ok": true,
        "data": rows,
        "meta": { "total": total, "page": pagination.page, "per_page": pagination.per_page },
    })))
}

fn book_id_from_path(raw: &str) -> ApiResult<i64> {
    match parse_int(raw) {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request("Missing or invalid book id")),
    }
}

/// GET /api/books/:id
pub async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let book_id = book_id_from_path(&id)?;
    let book = books::get_book(&state.db, book_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;
    Ok(Json(json!({ "ok": true, "data": book })))
}

/// Present and neither null nor an empty string
fn supplied(fields: &Fields, key: &str) -> bool {
    match fields.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// `year_published`: empty, null and 0 all mean unknown
fn year_value(fields: &Fields) -> Option<i64> {
    fields.int("year_published").filter(|y| *y != 0)
}

/// Positive id or `None`
fn positive_id(fields: &Fields, key: &str) -> Option<i64> {
    fields.int(key).filter(|id| *id > 0)
}

async fn placement_from(conn: &mut SqliteConnection, fields: &Fields) -> ApiResult<Option<i64>> {
    let Some(placement) = fields.object("placement") else {
        return Ok(None);
    };
    let bookcase = placement.int("bookcase_no").unwrap_or(0);
    let shelf = placement.int("shelf_no").unwrap_or(0);
    Ok(get_or_create_placement(conn, bookcase, shelf).await?)
}

/// POST /api/books
///
/// Accepts JSON, or multipart with the fields in a `payload` part and an
/// optional `image` file.
pub async fn create_book(
    State(state): State<AppState>,
    form: FormData,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let fields = &form.fields;
    let title = fields
        .normalized("title")
        .ok_or_else(|| ApiError::bad_request("Title is required"))?;

    let loaned_to = fields.normalized("loaned_to");
    let loaned_date = loaned_to.as_ref().and(fields.normalized("loaned_date"));
    if loaned_date.as_deref().is_some_and(|d| !is_iso_date(d)) {
        return Err(ApiError::bad_request(INVALID_LOANED_DATE));
    }

    let image = match form.file("image") {
        Some(file) => Some((file.clone(), validate_cover(file)?)),
        None => None,
    };

    let mut tx = state.db.begin().await?;

    let publisher_id = if supplied(fields, "publisher_id") {
        positive_id(fields, "publisher_id")
    } else {
        match fields.normalized("publisher") {
            Some(name) => get_or_create_by_name(&mut tx, NameTable::Publishers, &name).await?,
            None => None,
        }
    };
    let placement_id = placement_from(&mut tx, fields).await?;

    let book = NewBook {
        book_id: None,
        title,
        subtitle: fields.normalized("subtitle"),
        series: fields.normalized("series"),
        publisher_id,
        year_published: year_value(fields),
        isbn: fields.normalized("isbn"),
        lccn: fields.normalized("lccn"),
        notes: fields.normalized("notes"),
        cover_image: None,
        cover_thumb: None,
        loaned_to,
        loaned_date,
        placement_id,
    };
    let book_id = books::insert_book(&mut tx, &book).await?;

    let authors_hu = if fields.has("authors_is_hungarian") {
        fields.flag("authors_is_hungarian")
    } else {
        None
    };
    if let Some(authors) = fields.normalized("authors") {
        attach_authors(&mut tx, book_id, &authors, authors_hu).await?;
    }
    if let Some(subjects) = fields.normalized("subjects") {
        attach_subjects(&mut tx, book_id, &subjects).await?;
    }

    // A cover dropped into uploads/<id>/ before the book existed is adopted
    let disk_cover = book_dir(&state.layout.uploads_dir(), book_id).join("cover.jpg");
    let has_disk_cover = tokio::fs::metadata(&disk_cover)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if image.is_none() && has_disk_cover {
        let rel = relative_cover_path(book_id, "cover.jpg");
        books::set_cover(&mut tx, book_id, Some(&rel), Some(&rel)).await?;
    }
    tx.commit().await?;
    info!("Book {} created: {}", book_id, book.title);

    let mut cover = Value::Null;
    if let Some((file, kind)) = image {
        let uploads = state.layout.uploads_dir();
        match run_blocking(move || store_cover(&uploads, book_id, kind, &file.bytes)).await {
            Ok(stored) => {
                let mut conn = state.db.acquire().await?;
                books::set_cover(&mut *conn, book_id, Some(&stored.image), stored.thumb.as_deref()).await?;
                cover = json!({ "path": stored.image, "thumb": stored.thumb });
            }
            Err(e) => {
                warn!("Cover of new book {} not stored: {}", book_id, e);
                cover = json!({ "error": e.to_string() });
            }
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "data": { "id": book_id, "affected_rows": 1, "cover": cover },
            "message": "Book created.",
        })),
    ))
}

/// Column changes of an update request, validated
fn column_changes(fields: &Fields) -> ApiResult<Vec<(&'static str, ColumnValue)>> {
    let mut changes = Vec::new();
    let clears_loan = fields.has("loaned_to") && fields.normalized("loaned_to").is_none();

    for col in UPDATABLE_TEXT {
        if col == "loaned_date" && clears_loan {
            changes.push((col, ColumnValue::Text(None)));
            continue;
        }
        if !fields.has(col) {
            continue;
        }
        let value = fields.text(col).as_deref().and_then(normalize);
        if col == "loaned_date" && value.as_deref().is_some_and(|d| !is_iso_date(d)) {
            return Err(ApiError::bad_request(INVALID_LOANED_DATE));
        }
        changes.push((col, ColumnValue::Text(value)));
    }

    if fields.has("year_published") {
        changes.push(("year_published", ColumnValue::Int(year_value(fields))));
    }
    Ok(changes)
}

/// PUT /api/books/:id
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    fields: Fields,
) -> ApiResult<Json<Value>> {
    let book_id = book_id_from_path(&id)?;
    let mut changes = column_changes(&fields)?;
    if changes.iter().any(|(col, value)| *col == "title" && *value == ColumnValue::Text(None)) {
        return Err(ApiError::bad_request("Title is required"));
    }

    let publisher_present = fields.has("publisher_id") || fields.has("publisher");
    let placement_present = fields.has("placement") || fields.has("placement_id");
    let authors_present = fields.has("authors");
    let subjects_present = fields.has("subjects");
    let authors_hu = if fields.has("authors_is_hungarian") {
        fields.flag("authors_is_hungarian")
    } else {
        None
    };

    if changes.is_empty()
        && !publisher_present
        && !placement_present
        && !authors_present
        && !subjects_present
        && authors_hu.is_none()
    {
        return Err(ApiError::bad_request("No updatable fields provided"));
    }

    let mut tx = state.db.begin().await?;
    if !books::book_exists(&mut tx, book_id).await? {
        return Err(ApiError::not_found("Book not found"));
    }

    if publisher_present {
        let mut publisher_id = if supplied(&fields, "publisher_id") {
            positive_id(&fields, "publisher_id")
        } else {
            None
        };
        if publisher_id.is_none() {
            if let Some(name) = fields.normalized("publisher") {
                publisher_id = get_or_create_by_name(&mut tx, NameTable::Publishers, &name).await?;
            }
        }
        changes.push(("publisher_id", ColumnValue::Int(publisher_id)));
    }

    if placement_present {
        let placement_id = if supplied(&fields, "placement_id") {
            positive_id(&fields, "placement_id")
        } else {
            placement_from(&mut tx, &fields).await?
        };
        changes.push(("placement_id", ColumnValue::Int(placement_id)));
    }

    let affected_rows = books::update_book_columns(&mut tx, book_id, &changes).await?;

    if authors_present {
        books::clear_author_links(&mut tx, book_id).await?;
        if let Some(authors) = fields.normalized("authors") {
            attach_authors(&mut tx, book_id, &authors, authors_hu).await?;
        }
    }
    if subjects_present {
        books::clear_subject_links(&mut tx, book_id).await?;
        if let Some(subjects) = fields.normalized("subjects") {
            attach_subjects(&mut tx, book_id, &subjects).await?;
        }
    }
    if let Some(hu) = authors_hu {
        set_hungarian_for_book(&mut tx, book_id, hu).await?;
    }
    tx.commit().await?;
    info!("Book {} updated ({} columns)", book_id, changes.len());

    Ok(Json(json!({
        "ok": true,
        "data": { "id": book_id, "affected_rows": affected_rows },
    })))
}

/// DELETE /api/books/:id
///
/// Deleting a missing book succeeds with `affected_rows: 0`.
pub async fn delete_book(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let book_id = match parse_int(&id) {
        Some(id) if id > 0 => id,
        _ => return Err(ApiError::bad_request("Invalid or missing id")),
    };

    if books::cover_paths(&state.db, book_id).await?.is_none() {
        return Ok(Json(json!({
            "ok": true,
            "data": { "id": book_id, "affected_rows": 0 },
            "message": "Not found (already deleted)",
        })));
    }

    let deleted = books::delete_book(&state.db, book_id).await?;

    let dir = book_dir(&state.layout.uploads_dir(), book_id);
    run_blocking(move || {
        if dir.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }
        Ok(())
    })
    .await?;
    info!("Book {} deleted", book_id);

    Ok(Json(json!({
        "ok": true,
        "data": { "id": book_id, "affected_rows": deleted },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(value: Value) -> Fields {
        Fields::from_json_bytes(value.to_string().as_bytes())
    }

    #[test]
    fn test_column_changes_whitelist() {
        let changes = column_changes(&fields(json!({
            "title": " Dune ",
            "book_id": 5,
            "cover_image": "x.jpg",
            "year_published": "0",
        })))
        .unwrap();
        assert_eq!(
            changes,
            vec![
                ("title", ColumnValue::Text(Some("Dune".into()))),
                ("year_published", ColumnValue::Int(None)),
            ]
        );
    }

    #[test]
    fn test_clearing_loan_clears_date() {
        let changes = column_changes(&fields(json!({"loaned_to": "", "loaned_date": "2024-01-01"}))).unwrap();
        assert!(changes.contains(&("loaned_to", ColumnValue::Text(None))));
        assert!(changes.contains(&("loaned_date", ColumnValue::Text(None))));
    }

    #[test]
    fn test_invalid_loaned_date() {
        let err = column_changes(&fields(json!({"loaned_to": "Ann", "loaned_date": "2024-02-30"}))).unwrap_err();
        assert_eq!(err.to_string(), INVALID_LOANED_DATE);
    }

    #[test]
    fn test_supplied() {
        let f = fields(json!({"a": "", "b": null, "c": 0, "d": "7"}));
        assert!(!supplied(&f, "a"));
        assert!(!supplied(&f, "b"));
        assert!(supplied(&f, "c"));
        assert!(supplied(&f, "d"));
        assert!(!supplied(&f, "missing"));
    }
}
