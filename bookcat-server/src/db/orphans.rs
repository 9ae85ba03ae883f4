//! Orphaned rows: authors without books, publishers without books and
//! author links pointing at missing rows

use bookcat_common::authors::{format_display, format_sort};
use bookcat_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

const ORPHAN_LIMIT: i64 = 500;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrphanAuthor {
    pub author_id: i64,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sort_name: Option<String>,
    pub is_hungarian: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrphanPublisher {
    pub publisher_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrphanLink {
    pub book_id: i64,
    pub author_id: i64,
    pub book_title: Option<String>,
    pub author_name: Option<String>,
}

pub async fn orphan_authors(pool: &SqlitePool) -> Result<Vec<OrphanAuthor>> {
    Ok(sqlx::query_as::<_, OrphanAuthor>(
        r#"
        SELECT a.author_id, a.name, a.first_name, a.last_name, a.sort_name, a.is_hungarian
        FROM Authors a
        LEFT JOIN Books_Authors ba ON ba.author_id = a.author_id
        WHERE ba.author_id IS NULL
        ORDER BY a.author_id DESC
        LIMIT ?
        "#,
    )
    .bind(ORPHAN_LIMIT)
    .fetch_all(pool)
    .await?)
}

pub async fn orphan_publishers(pool: &SqlitePool) -> Result<Vec<OrphanPublisher>> {
    Ok(sqlx::query_as::<_, OrphanPublisher>(
        r#"
        SELECT p.publisher_id, p.name
        FROM Publishers p
        LEFT JOIN Books b ON b.publisher_id = p.publisher_id
        WHERE b.publisher_id IS NULL
        ORDER BY p.publisher_id DESC
        LIMIT ?
        "#,
    )
    .bind(ORPHAN_LIMIT)
    .fetch_all(pool)
    .await?)
}

pub async fn orphan_links(pool: &SqlitePool) -> Result<Vec<OrphanLink>> {
    Ok(sqlx::query_as::<_, OrphanLink>(
        r#"
        SELECT ba.book_id, ba.author_id, b.title AS book_title, a.name AS author_name
        FROM Books_Authors ba
        LEFT JOIN Books b ON b.book_id = ba.book_id
        LEFT JOIN Authors a ON a.author_id = ba.author_id
        WHERE b.book_id IS NULL OR a.author_id IS NULL
        ORDER BY ba.book_id DESC, ba.author_id DESC
        LIMIT ?
        "#,
    )
    .bind(ORPHAN_LIMIT)
    .fetch_all(pool)
    .await?)
}

pub async fn author_has_links(pool: &SqlitePool, author_id: i64) -> Result<bool> {
    let hit = sqlx::query_scalar::<_, i64>("SELECT 1 FROM Books_Authors WHERE author_id = ? LIMIT 1")
        .bind(author_id)
        .fetch_optional(pool)
        .await?;
    Ok(hit.is_some())
}

pub async fn publisher_has_books(pool: &SqlitePool, publisher_id: i64) -> Result<bool> {
    let hit = sqlx::query_scalar::<_, i64>("SELECT 1 FROM Books WHERE publisher_id = ? LIMIT 1")
        .bind(publisher_id)
        .fetch_optional(pool)
        .await?;
    Ok(hit.is_some())
}

pub async fn delete_author_row(pool: &SqlitePool, author_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM Authors WHERE author_id = ?")
        .bind(author_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_publisher(pool: &SqlitePool, publisher_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM Publishers WHERE publisher_id = ?")
        .bind(publisher_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Raw author edit; with `is_hungarian` set, name and sort name are
/// recomputed from the parts
#[derive(Debug, Clone, Default)]
pub struct AuthorEdit {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sort_name: Option<String>,
    pub is_hungarian: Option<bool>,
}

pub async fn edit_author(pool: &SqlitePool, author_id: i64, edit: &AuthorEdit) -> Result<u64> {
    let first = edit.first_name.as_deref();
    let last = edit.last_name.as_deref();
    let (name, sort) = match edit.is_hungarian {
        Some(hu) => (
            Some(format_display(first, last, hu)).filter(|s| !s.is_empty()),
            Some(format_sort(first, last)).filter(|s| !s.is_empty()),
        ),
        None => (edit.name.clone(), edit.sort_name.clone()),
    };

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE Authors SET name = ?, first_name = ?, last_name = ?, sort_name = ? WHERE author_id = ?",
    )
    .bind(name)
    .bind(first)
    .bind(last)
    .bind(sort)
    .bind(author_id)
    .execute(&mut *tx)
    .await?;
    if let Some(hu) = edit.is_hungarian {
        sqlx::query("UPDATE Authors SET is_hungarian = ? WHERE author_id = ?")
            .bind(hu)
            .bind(author_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(result.rows_affected())
}

pub async fn rename_publisher(pool: &SqlitePool, publisher_id: i64, name: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE Publishers SET name = ? WHERE publisher_id = ?")
        .bind(name)
        .bind(publisher_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_link(pool: &SqlitePool, book_id: i64, author_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM Books_Authors WHERE book_id = ? AND author_id = ?")
        .bind(book_id)
        .bind(author_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Point a link at another author; `None` when the target author is missing.
///
/// When the book is already linked to the target, the old link is dropped
/// instead of violating the primary key.
pub async fn reassign_link(
    pool: &SqlitePool,
    book_id: i64,
    author_id: i64,
    new_author_id: i64,
) -> Result<Option<u64>> {
    let mut tx = pool.begin().await?;
    let target = sqlx::query_scalar::<_, i64>("SELECT 1 FROM Authors WHERE author_id = ? LIMIT 1")
        .bind(new_author_id)
        .fetch_optional(&mut *tx)
        .await?;
    if target.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    let updated = sqlx::query("UPDATE OR IGNORE Books_Authors SET author_id = ? WHERE book_id = ? AND author_id = ?")
        .bind(new_author_id)
        .bind(book_id)
        .bind(author_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if updated == 0 && author_id != new_author_id {
        sqlx::query("DELETE FROM Books_Authors WHERE book_id = ? AND author_id = ?")
            .bind(book_id)
            .bind(author_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(Some(updated))
}
