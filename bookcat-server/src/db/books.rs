//! Book queries
//!
//! One row per book; authors and subjects are folded into `"; "`-joined
//! strings by correlated subqueries so paging stays on the Books table.

use bookcat_common::Result;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::authors::AUTHOR_DISPLAY_SQL;
use crate::db::SortDir;
use crate::pagination::Pagination;

/// Book row as listed and fetched
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BookRow {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub series: Option<String>,
    pub year_published: Option<i64>,
    pub isbn: Option<String>,
    pub lccn: Option<String>,
    pub notes: Option<String>,
    pub cover_image: Option<String>,
    pub cover_thumb: Option<String>,
    pub has_cover: i64,
    pub loaned_to: Option<String>,
    pub loaned_date: Option<String>,
    pub loan_status: String,
    pub publisher: Option<String>,
    pub publisher_id: Option<i64>,
    pub placement_id: Option<i64>,
    pub bookcase_no: Option<i64>,
    pub shelf_no: Option<i64>,
    pub authors: Option<String>,
    pub authors_hu: Option<String>,
    pub authors_hu_flag: Option<i64>,
    pub subjects: Option<String>,
}

impl BookRow {
    /// File name part of the cover path
    pub fn cover_filename(&self) -> Option<String> {
        self.cover_image
            .as_deref()
            .and_then(|p| p.rsplit(['/', '\\']).next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

const LOANED_SQL: &str = "(COALESCE(TRIM(b.loaned_to), '') <> '' OR b.loaned_date IS NOT NULL)";

fn book_select() -> String {
    format!(
        r#"
        SELECT
            b.book_id AS id,
            b.title, b.subtitle, b.series, b.year_published, b.isbn, b.lccn, b.notes,
            b.cover_image, b.cover_thumb,
            CASE WHEN COALESCE(b.cover_image, '') <> '' THEN 1 ELSE 0 END AS has_cover,
            b.loaned_to, b.loaned_date,
            CASE WHEN {loaned} THEN 'Loaned' ELSE 'In collection' END AS loan_status,
            p.name AS publisher,
            b.publisher_id, b.placement_id, pl.bookcase_no, pl.shelf_no,
            (SELECT GROUP_CONCAT({display}, '; ' ORDER BY ba.author_ord, a.author_id)
               FROM Books_Authors ba JOIN Authors a ON a.author_id = ba.author_id
              WHERE ba.book_id = b.book_id) AS authors,
            (SELECT CASE
                        WHEN COUNT(*) = 0 THEN NULL
                        WHEN MIN(a.is_hungarian) = 1 THEN 'HU'
                        WHEN MAX(a.is_hungarian) = 0 THEN 'No'
                        ELSE 'HU; No'
                    END
               FROM Books_Authors ba JOIN Authors a ON a.author_id = ba.author_id
              WHERE ba.book_id = b.book_id) AS authors_hu,
            (SELECT CASE
                        WHEN COUNT(*) = 0 THEN NULL
                        WHEN MIN(a.is_hungarian) = MAX(a.is_hungarian) THEN MAX(a.is_hungarian)
                        ELSE NULL
                    END
               FROM Books_Authors ba JOIN Authors a ON a.author_id = ba.author_id
              WHERE ba.book_id = b.book_id) AS authors_hu_flag,
            (SELECT GROUP_CONCAT(s.name, '; ' ORDER BY s.name)
               FROM Books_Subjects bs JOIN Subjects s ON s.subject_id = bs.subject_id
              WHERE bs.book_id = b.book_id) AS subjects
        FROM Books b
        LEFT JOIN Publishers p ON p.publisher_id = b.publisher_id
        LEFT JOIN Placement pl ON pl.placement_id = b.placement_id
        "#,
        loaned = LOANED_SQL,
        display = AUTHOR_DISPLAY_SQL,
    )
}

const FROM_FOR_COUNT: &str = r#"
    FROM Books b
    LEFT JOIN Publishers p ON p.publisher_id = b.publisher_id
"#;

/// Free-text book filter
///
/// Whitespace-separated tokens must all match; a token matches when any
/// searched column or linked author name contains it.
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    tokens: Vec<String>,
    include_notes: bool,
}

impl BookFilter {
    /// Filter used by the list view (searches notes)
    pub fn for_list(q: &str) -> Self {
        Self {
            tokens: q.split_whitespace().map(str::to_string).collect(),
            include_notes: true,
        }
    }

    /// Filter used by exports (notes are not searched)
    pub fn for_export(q: &str) -> Self {
        Self {
            include_notes: false,
            ..Self::for_list(q)
        }
    }

    fn bind_count(&self) -> usize {
        self.tokens.len()
    }

    /// `WHERE` clause using numbered parameters `?1..?n`
    fn where_sql(&self) -> String {
        if self.tokens.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = (1..=self.tokens.len())
            .map(|i| {
                let notes = if self.include_notes {
                    format!(" OR b.notes LIKE ?{i}")
                } else {
                    String::new()
                };
                format!(
                    "(b.title LIKE ?{i} OR b.subtitle LIKE ?{i} OR b.series LIKE ?{i} \
                     OR b.isbn LIKE ?{i} OR b.lccn LIKE ?{i}{notes} OR p.name LIKE ?{i} \
                     OR EXISTS (SELECT 1 FROM Books_Authors fa JOIN Authors fau ON fau.author_id = fa.author_id \
                                WHERE fa.book_id = b.book_id \
                                  AND (fau.name LIKE ?{i} OR fau.first_name LIKE ?{i} \
                                       OR fau.last_name LIKE ?{i} OR fau.sort_name LIKE ?{i})))"
                )
            })
            .collect();
        format!("WHERE {}", clauses.join(" AND "))
    }

    fn patterns(&self) -> impl Iterator<Item = String> + '_ {
        self.tokens.iter().map(|t| format!("%{}%", t))
    }
}

/// `ORDER BY` terms for a list sort key; the bool says whether `dir` applies
fn list_sort_terms(key: &str) -> Vec<(String, bool)> {
    let directed = |expr: &str| vec![(expr.to_string(), true)];
    let nulls_last = |expr: &str| {
        vec![
            (format!("CASE WHEN {} IS NULL THEN 1 ELSE 0 END", expr), false),
            (expr.to_string(), true),
        ]
    };
    match key {
        "title" => directed("b.title"),
        "subtitle" => directed("b.subtitle"),
        "series" => directed("b.series"),
        "publisher" => directed("p.name"),
        "year" => directed("b.year_published"),
        "authors" => nulls_last("authors"),
        "authors_hu" => nulls_last("authors_hu_flag"),
        "bookcase" => vec![("pl.bookcase_no".to_string(), true), ("pl.shelf_no".to_string(), true)],
        "cover" => directed("has_cover"),
        "status" => directed(&format!("CASE WHEN {} THEN 1 ELSE 0 END", LOANED_SQL)),
        "isbn" => directed("b.isbn"),
        "loaned_to" => directed("b.loaned_to"),
        "loaned_date" => directed("b.loaned_date"),
        "subjects" => nulls_last("subjects"),
        "notes" => directed("b.notes"),
        _ => directed("b.book_id"),
    }
}

/// Export sort keys are a subset of the list's
fn export_sort_terms(key: &str) -> Vec<(String, bool)> {
    match key {
        "id" | "subtitle" | "series" | "publisher" | "year" | "authors" | "bookcase" | "notes" => {
            list_sort_terms(key)
        }
        _ => list_sort_terms("title"),
    }
}

fn order_sql(terms: Vec<(String, bool)>, dir: SortDir, tie_break: &str) -> String {
    let mut parts: Vec<String> = terms
        .into_iter()
        .map(|(expr, directed)| {
            if directed {
                format!("{} {}", expr, dir.as_sql())
            } else {
                expr
            }
        })
        .collect();
    parts.push(tie_break.to_string());
    format!("ORDER BY {}", parts.join(", "))
}

/// Number of books matching a filter
pub async fn count_books(pool: &SqlitePool, filter: &BookFilter) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) {} {}", FROM_FOR_COUNT, filter.where_sql());
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for pattern in filter.patterns() {
        query = query.bind(pattern);
    }
    Ok(query.fetch_one(pool).await?)
}

/// One page of the book list
pub async fn list_books(
    pool: &SqlitePool,
    filter: &BookFilter,
    sort: &str,
    dir: SortDir,
    page: Pagination,
) -> Result<Vec<BookRow>> {
    let n = filter.bind_count();
    let sql = format!(
        "{} {} {} LIMIT ?{} OFFSET ?{}",
        book_select(),
        filter.where_sql(),
        order_sql(list_sort_terms(sort), dir, "b.book_id DESC"),
        n + 1,
        n + 2
    );
    let mut query = sqlx::query_as::<_, BookRow>(&sql);
    for pattern in filter.patterns() {
        query = query.bind(pattern);
    }
    Ok(query
        .bind(page.per_page)
        .bind(page.offset)
        .fetch_all(pool)
        .await?)
}

/// Every matching book, in export order
pub async fn export_books(
    pool: &SqlitePool,
    filter: &BookFilter,
    sort: &str,
    dir: SortDir,
) -> Result<Vec<BookRow>> {
    let sql = format!(
        "{} {} {}",
        book_select(),
        filter.where_sql(),
        order_sql(export_sort_terms(sort), dir, "b.book_id ASC")
    );
    let mut query = sqlx::query_as::<_, BookRow>(&sql);
    for pattern in filter.patterns() {
        query = query.bind(pattern);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Single book by id
pub async fn get_book(pool: &SqlitePool, book_id: i64) -> Result<Option<BookRow>> {
    let sql = format!("{} WHERE b.book_id = ?", book_select());
    Ok(sqlx::query_as::<_, BookRow>(&sql)
        .bind(book_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn book_exists(conn: &mut SqliteConnection, book_id: i64) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM Books WHERE book_id = ? LIMIT 1")
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Scalar columns of a new book
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    /// Explicit id (imports); `None` lets SQLite assign one
    pub book_id: Option<i64>,
    pub title: String,
    pub subtitle: Option<String>,
    pub series: Option<String>,
    pub publisher_id: Option<i64>,
    pub year_published: Option<i64>,
    pub isbn: Option<String>,
    pub lccn: Option<String>,
    pub notes: Option<String>,
    pub cover_image: Option<String>,
    pub cover_thumb: Option<String>,
    pub loaned_to: Option<String>,
    pub loaned_date: Option<String>,
    pub placement_id: Option<i64>,
}

/// Insert a book row; returns its id
pub async fn insert_book(conn: &mut SqliteConnection, book: &NewBook) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO Books
            (book_id, title, subtitle, series, publisher_id, year_published, isbn, lccn, notes,
             cover_image, cover_thumb, loaned_to, loaned_date, placement_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(book.book_id)
    .bind(&book.title)
    .bind(&book.subtitle)
    .bind(&book.series)
    .bind(book.publisher_id)
    .bind(book.year_published)
    .bind(&book.isbn)
    .bind(&book.lccn)
    .bind(&book.notes)
    .bind(&book.cover_image)
    .bind(&book.cover_thumb)
    .bind(&book.loaned_to)
    .bind(&book.loaned_date)
    .bind(book.placement_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// New value of one updatable column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(Option<String>),
    Int(Option<i64>),
}

/// Apply column changes to one book; column names come from a fixed list
pub async fn update_book_columns(
    conn: &mut SqliteConnection,
    book_id: i64,
    changes: &[(&'static str, ColumnValue)],
) -> Result<u64> {
    if changes.is_empty() {
        return Ok(0);
    }
    let assignments: Vec<String> = changes.iter().map(|(col, _)| format!("{} = ?", col)).collect();
    let sql = format!("UPDATE Books SET {} WHERE book_id = ?", assignments.join(", "));
    let mut query = sqlx::query(&sql);
    for (_, value) in changes {
        query = match value {
            ColumnValue::Text(v) => query.bind(v.clone()),
            ColumnValue::Int(v) => query.bind(*v),
        };
    }
    let result = query.bind(book_id).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Set both cover columns
pub async fn set_cover(
    conn: &mut SqliteConnection,
    book_id: i64,
    cover_image: Option<&str>,
    cover_thumb: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query("UPDATE Books SET cover_image = ?, cover_thumb = ? WHERE book_id = ?")
        .bind(cover_image)
        .bind(cover_thumb)
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Current cover columns of a book; `None` when the book is missing
pub async fn cover_paths(
    pool: &SqlitePool,
    book_id: i64,
) -> Result<Option<(Option<String>, Option<String>)>> {
    Ok(sqlx::query_as::<_, (Option<String>, Option<String>)>(
        "SELECT cover_image, cover_thumb FROM Books WHERE book_id = ?",
    )
    .bind(book_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn clear_author_links(conn: &mut SqliteConnection, book_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM Books_Authors WHERE book_id = ?")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn clear_subject_links(conn: &mut SqliteConnection, book_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM Books_Subjects WHERE book_id = ?")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete a book and its links in one transaction; returns rows deleted
pub async fn delete_book(pool: &SqlitePool, book_id: i64) -> Result<u64> {
    let mut tx = pool.begin().await?;
    clear_author_links(&mut tx, book_id).await?;
    clear_subject_links(&mut tx, book_id).await?;
    let result = sqlx::query("DELETE FROM Books WHERE book_id = ?")
        .bind(book_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}
