//! Author queries
//!
//! Authors are matched by every spelling they may be stored under before a
//! new row is created; see [`AuthorCandidates`].

use bookcat_common::authors::{
    format_display, format_sort, is_blank_author, split_author_list, AuthorCandidates,
};
use bookcat_common::Result;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::SortDir;
use crate::pagination::Pagination;

/// Display name of author `a`: stored name, else first/last in the author's
/// name order, else the sort name
pub const AUTHOR_DISPLAY_SQL: &str = "COALESCE(NULLIF(TRIM(a.name), ''), \
     NULLIF(TRIM(CASE WHEN a.is_hungarian = 1 \
          THEN COALESCE(a.last_name, '') || ' ' || COALESCE(a.first_name, '') \
          ELSE COALESCE(a.first_name, '') || ' ' || COALESCE(a.last_name, '') END), ''), \
     NULLIF(TRIM(a.sort_name), ''))";

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

async fn first_match(
    conn: &mut SqliteConnection,
    sql: &str,
    a: &str,
    b: &str,
) -> Result<Option<i64>> {
    if a.is_empty() && b.is_empty() {
        return Ok(None);
    }
    let id = sqlx::query_scalar::<_, i64>(sql)
        .bind(a)
        .bind(b)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Find an existing author matching free text, or create one
///
/// `force_hungarian` overrides the name-order guess (a comma means
/// Hungarian order). Blank input gives `None`.
pub async fn get_or_create_from_free(
    conn: &mut SqliteConnection,
    free_text: &str,
    force_hungarian: Option<bool>,
) -> Result<Option<i64>> {
    if is_blank_author(free_text) {
        return Ok(None);
    }
    let Some(c) = AuthorCandidates::new(free_text, force_hungarian) else {
        return Ok(None);
    };

    const BY_SORT: &str = "SELECT author_id FROM Authors WHERE sort_name IN (?, ?) LIMIT 1";
    const BY_NAME: &str = "SELECT author_id FROM Authors WHERE name IN (?, ?) LIMIT 1";
    const BY_FIRST_LAST: &str = "SELECT author_id FROM Authors \
         WHERE TRIM(COALESCE(first_name, '') || ' ' || COALESCE(last_name, '')) IN (?, ?) LIMIT 1";
    const BY_LAST_FIRST: &str = "SELECT author_id FROM Authors \
         WHERE TRIM(COALESCE(last_name, '') || ' ' || COALESCE(first_name, '')) IN (?, ?) LIMIT 1";

    if let Some(id) = first_match(conn, BY_SORT, &c.sort, &c.sort_legacy).await? {
        return Ok(Some(id));
    }
    if c.alt_sort_differs() {
        if let Some(id) = first_match(conn, BY_SORT, &c.alt_sort, &c.alt_sort_legacy).await? {
            return Ok(Some(id));
        }
    }
    if let Some(id) = first_match(conn, BY_NAME, &c.display, &c.name_comma).await? {
        return Ok(Some(id));
    }
    if c.alt_name_differs() {
        if let Some(id) = first_match(conn, BY_NAME, &c.alt_display, &c.alt_name_comma).await? {
            return Ok(Some(id));
        }
    }
    if let Some(id) = first_match(conn, BY_FIRST_LAST, &c.first_last, &c.alt_first_last).await? {
        return Ok(Some(id));
    }
    if let Some(id) = first_match(conn, BY_LAST_FIRST, &c.last_first, &c.alt_last_first).await? {
        return Ok(Some(id));
    }

    let result = sqlx::query(
        "INSERT INTO Authors (name, first_name, last_name, sort_name, is_hungarian) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(non_empty(&c.display))
    .bind(non_empty(&c.parsed.first))
    .bind(non_empty(&c.parsed.last))
    .bind(non_empty(&c.sort))
    .bind(c.is_hungarian)
    .execute(&mut *conn)
    .await?;
    Ok(Some(result.last_insert_rowid()))
}

/// Link every author of a free-text list to a book, in list order
///
/// Authors already linked are left alone; new links get the next
/// `author_ord`.
pub async fn attach_authors(
    conn: &mut SqliteConnection,
    book_id: i64,
    authors: &str,
    force_hungarian: Option<bool>,
) -> Result<()> {
    for name in split_author_list(authors) {
        let Some(author_id) = get_or_create_from_free(conn, &name, force_hungarian).await? else {
            continue;
        };
        let linked = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM Books_Authors WHERE book_id = ? AND author_id = ? LIMIT 1",
        )
        .bind(book_id)
        .bind(author_id)
        .fetch_optional(&mut *conn)
        .await?;
        if linked.is_some() {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO Books_Authors (book_id, author_id, author_ord)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(author_ord), 0) + 1 FROM Books_Authors WHERE book_id = ?1))
            "#,
        )
        .bind(book_id)
        .bind(author_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Set the name-order flag of every author linked to a book and rebuild
/// their display and sort names
pub async fn set_hungarian_for_book(
    conn: &mut SqliteConnection,
    book_id: i64,
    is_hungarian: bool,
) -> Result<()> {
    let linked = sqlx::query_as::<_, (i64, Option<String>, Option<String>)>(
        r#"
        SELECT a.author_id, a.first_name, a.last_name
        FROM Authors a
        JOIN Books_Authors ba ON ba.author_id = a.author_id
        WHERE ba.book_id = ?
        "#,
    )
    .bind(book_id)
    .fetch_all(&mut *conn)
    .await?;

    for (author_id, first, last) in linked {
        let display = format_display(first.as_deref(), last.as_deref(), is_hungarian);
        let sort = format_sort(first.as_deref(), last.as_deref());
        sqlx::query(
            r#"
            UPDATE Authors
               SET is_hungarian = ?,
                   name = COALESCE(?, name),
                   sort_name = COALESCE(?, sort_name)
             WHERE author_id = ?
            "#,
        )
        .bind(is_hungarian)
        .bind(non_empty(&display))
        .bind(non_empty(&sort))
        .bind(author_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Row of the author admin list
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthorRow {
    pub author_id: i64,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sort_name: Option<String>,
    pub is_hungarian: i64,
}

/// Sortable author columns; unknown keys sort by display name
pub fn author_sort_expr(key: &str) -> String {
    match key {
        "id" => "a.author_id".to_string(),
        "first_name" => "a.first_name".to_string(),
        "last_name" => "a.last_name".to_string(),
        "sort_name" => "a.sort_name".to_string(),
        _ => AUTHOR_DISPLAY_SQL.to_string(),
    }
}

/// One page of authors plus the filtered total
pub async fn list_authors(
    pool: &SqlitePool,
    q: &str,
    sort: &str,
    dir: SortDir,
    page: Pagination,
) -> Result<(Vec<AuthorRow>, i64)> {
    let q = q.trim();
    let filter = if q.is_empty() {
        String::new()
    } else {
        "WHERE (a.name LIKE ?1 OR a.first_name LIKE ?1 OR a.last_name LIKE ?1 OR a.sort_name LIKE ?1)"
            .to_string()
    };
    let like = format!("%{}%", q);

    let count_sql = format!("SELECT COUNT(*) FROM Authors a {}", filter);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if !q.is_empty() {
        count_query = count_query.bind(&like);
    }
    let total = count_query.fetch_one(pool).await?;

    let (limit_param, offset_param) = if q.is_empty() { ("?1", "?2") } else { ("?2", "?3") };
    let list_sql = format!(
        r#"
        SELECT a.author_id, {display} AS name, a.first_name, a.last_name, a.sort_name, a.is_hungarian
        FROM Authors a
        {filter}
        ORDER BY {order} {dir}, a.author_id {dir}
        LIMIT {limit_param} OFFSET {offset_param}
        "#,
        display = AUTHOR_DISPLAY_SQL,
        filter = filter,
        order = author_sort_expr(sort),
        dir = dir.as_sql(),
        limit_param = limit_param,
        offset_param = offset_param,
    );
    let mut list_query = sqlx::query_as::<_, AuthorRow>(&list_sql);
    if !q.is_empty() {
        list_query = list_query.bind(&like);
    }
    let rows = list_query
        .bind(page.per_page)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    Ok((rows, total))
}

/// Author fields as submitted to create/update
#[derive(Debug, Clone, Default)]
pub struct AuthorInput {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sort_name: Option<String>,
    pub is_hungarian: bool,
}

/// Outcome of [`create_author`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Existing(i64),
    Created(i64),
}

/// Return an author matching the sort name or name, else insert one
pub async fn create_author(pool: &SqlitePool, input: &AuthorInput) -> Result<CreateOutcome> {
    if let Some(sort) = &input.sort_name {
        if let Some(id) = sqlx::query_scalar::<_, i64>("SELECT author_id FROM Authors WHERE sort_name = ? LIMIT 1")
            .bind(sort)
            .fetch_optional(pool)
            .await?
        {
            return Ok(CreateOutcome::Existing(id));
        }
    }
    if let Some(name) = &input.name {
        if let Some(id) = sqlx::query_scalar::<_, i64>("SELECT author_id FROM Authors WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(pool)
            .await?
        {
            return Ok(CreateOutcome::Existing(id));
        }
    }

    let result = sqlx::query(
        "INSERT INTO Authors (name, first_name, last_name, sort_name, is_hungarian) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&input.name)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.sort_name)
    .bind(input.is_hungarian)
    .execute(pool)
    .await?;
    Ok(CreateOutcome::Created(result.last_insert_rowid()))
}

/// Outcome of [`update_author`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { affected_rows: u64 },
    MergedInto(i64),
}

/// Update an author; a name clash with another author merges this one into it
///
/// `is_hungarian` is only written when supplied.
pub async fn update_author(
    pool: &SqlitePool,
    author_id: i64,
    input: &AuthorInput,
    is_hungarian: Option<bool>,
) -> Result<UpdateOutcome> {
    if let Some(name) = &input.name {
        let clash = sqlx::query_scalar::<_, i64>(
            "SELECT author_id FROM Authors WHERE name = ? AND author_id <> ? LIMIT 1",
        )
        .bind(name)
        .bind(author_id)
        .fetch_optional(pool)
        .await?;

        if let Some(target_id) = clash {
            let mut tx = pool.begin().await?;
            merge_author(&mut tx, author_id, target_id).await?;
            tx.commit().await?;
            return Ok(UpdateOutcome::MergedInto(target_id));
        }
    }

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE Authors
           SET name = ?, first_name = ?, last_name = ?, sort_name = ?
         WHERE author_id = ?
        "#,
    )
    .bind(&input.name)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.sort_name)
    .bind(author_id)
    .execute(&mut *tx)
    .await?;

    if let Some(flag) = is_hungarian {
        sqlx::query("UPDATE Authors SET is_hungarian = ? WHERE author_id = ?")
            .bind(flag)
            .bind(author_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(UpdateOutcome::Updated {
        affected_rows: result.rows_affected(),
    })
}

/// Move all links of `from` onto `into` and delete `from`
async fn merge_author(conn: &mut SqliteConnection, from: i64, into: i64) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM Books_Authors
         WHERE author_id = ?1
           AND book_id IN (SELECT book_id FROM Books_Authors WHERE author_id = ?2)
        "#,
    )
    .bind(from)
    .bind(into)
    .execute(&mut *conn)
    .await?;
    sqlx::query("UPDATE Books_Authors SET author_id = ? WHERE author_id = ?")
        .bind(into)
        .bind(from)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM Authors WHERE author_id = ?")
        .bind(from)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete an author and its links; returns `(links_cleared, affected_rows)`
pub async fn delete_author(pool: &SqlitePool, author_id: i64) -> Result<(u64, u64)> {
    let mut tx = pool.begin().await?;
    let links = sqlx::query("DELETE FROM Books_Authors WHERE author_id = ?")
        .bind(author_id)
        .execute(&mut *tx)
        .await?;
    let author = sqlx::query("DELETE FROM Authors WHERE author_id = ?")
        .bind(author_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok((links.rows_affected(), author.rows_affected()))
}

/// Autocomplete row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthorMatch {
    pub id: i64,
    pub name: Option<String>,
}

/// Authors whose name parts contain `q`; display-name prefix matches first
pub async fn search_authors(pool: &SqlitePool, q: &str, limit: i64) -> Result<Vec<AuthorMatch>> {
    let sql = format!(
        r#"
        SELECT a.author_id AS id, {display} AS name
        FROM Authors a
        WHERE a.name LIKE ?1 OR a.first_name LIKE ?1 OR a.last_name LIKE ?1 OR a.sort_name LIKE ?1
        ORDER BY CASE WHEN {display} LIKE ?2 THEN 0 ELSE 1 END, {display}
        LIMIT ?3
        "#,
        display = AUTHOR_DISPLAY_SQL
    );
    let rows = sqlx::query_as::<_, AuthorMatch>(&sql)
        .bind(format!("%{}%", q))
        .bind(format!("{}%", q))
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
