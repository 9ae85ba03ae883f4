//! Publishers, subjects and shelf placements
//!
//! All three are looked up by value and created on first use. The
//! get-or-create helpers take a connection so they run inside the caller's
//! transaction.

use bookcat_common::text::collapse_whitespace;
use bookcat_common::Result;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

/// Name-keyed lookup tables
#[derive(Debug, Clone, Copy)]
pub enum NameTable {
    Publishers,
    Subjects,
}

impl NameTable {
    fn table(&self) -> &'static str {
        match self {
            Self::Publishers => "Publishers",
            Self::Subjects => "Subjects",
        }
    }

    fn id_column(&self) -> &'static str {
        match self {
            Self::Publishers => "publisher_id",
            Self::Subjects => "subject_id",
        }
    }
}

/// Id of a name, if already present (case-insensitive)
pub async fn find_id_by_name(
    conn: &mut SqliteConnection,
    table: NameTable,
    name: &str,
) -> Result<Option<i64>> {
    let name = collapse_whitespace(name);
    if name.is_empty() {
        return Ok(None);
    }
    let sql = format!(
        "SELECT {} FROM {} WHERE name = ? LIMIT 1",
        table.id_column(),
        table.table()
    );
    let id = sqlx::query_scalar::<_, i64>(&sql)
        .bind(&name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Id of a name, inserting it when missing; blank names give `None`
pub async fn get_or_create_by_name(
    conn: &mut SqliteConnection,
    table: NameTable,
    name: &str,
) -> Result<Option<i64>> {
    let name = collapse_whitespace(name);
    if name.is_empty() {
        return Ok(None);
    }
    if let Some(id) = find_id_by_name(conn, table, &name).await? {
        return Ok(Some(id));
    }
    let sql = format!("INSERT INTO {} (name) VALUES (?)", table.table());
    let result = sqlx::query(&sql).bind(&name).execute(&mut *conn).await?;
    Ok(Some(result.last_insert_rowid()))
}

/// Placement id for a bookcase/shelf pair, created on first use
///
/// Both numbers must be positive.
pub async fn get_or_create_placement(
    conn: &mut SqliteConnection,
    bookcase_no: i64,
    shelf_no: i64,
) -> Result<Option<i64>> {
    if bookcase_no <= 0 || shelf_no <= 0 {
        return Ok(None);
    }
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT placement_id FROM Placement WHERE bookcase_no = ? AND shelf_no = ? LIMIT 1",
    )
    .bind(bookcase_no)
    .bind(shelf_no)
    .fetch_optional(&mut *conn)
    .await?;
    if existing.is_some() {
        return Ok(existing);
    }
    let result = sqlx::query("INSERT INTO Placement (bookcase_no, shelf_no) VALUES (?, ?)")
        .bind(bookcase_no)
        .bind(shelf_no)
        .execute(&mut *conn)
        .await?;
    Ok(Some(result.last_insert_rowid()))
}

/// Split a subject list on `;`/`,`, trimming and dropping case-insensitive repeats
pub fn split_subjects(input: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    input
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Link subjects to a book, creating missing subjects
pub async fn attach_subjects(conn: &mut SqliteConnection, book_id: i64, subjects: &str) -> Result<()> {
    for name in split_subjects(subjects) {
        if let Some(subject_id) = get_or_create_by_name(conn, NameTable::Subjects, &name).await? {
            sqlx::query("INSERT OR IGNORE INTO Books_Subjects (book_id, subject_id) VALUES (?, ?)")
                .bind(book_id)
                .bind(subject_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

/// Autocomplete row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NameMatch {
    pub id: i64,
    pub name: String,
}

/// Publishers containing `q`, prefix matches first
pub async fn search_publishers(pool: &SqlitePool, q: &str, limit: i64) -> Result<Vec<NameMatch>> {
    let rows = sqlx::query_as::<_, NameMatch>(
        r#"
        SELECT publisher_id AS id, name
        FROM Publishers
        WHERE name LIKE ?1
        ORDER BY CASE WHEN name LIKE ?2 THEN 0 ELSE 1 END, name
        LIMIT ?3
        "#,
    )
    .bind(format!("%{}%", q))
    .bind(format!("{}%", q))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
