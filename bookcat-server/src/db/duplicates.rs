//! Duplicate-candidate report and review decisions

use std::collections::{BTreeMap, HashMap};

use bookcat_common::duplicates::{
    author_key_part, compare_groups, dup_key, format_author_label, format_title_display, ReviewStatus,
    StatusFilter,
};
use bookcat_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

/// Book as shown inside a duplicate group
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateBook {
    pub book_id: i64,
    pub title: String,
    pub subtitle: String,
    pub authors: Vec<String>,
    pub publisher_name: String,
    pub year_published: Option<i64>,
    pub isbn: String,
    pub location: String,
}

/// One group of candidate duplicates with its review state
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub dup_key: String,
    pub size: usize,
    pub status: &'static str,
    pub note: Option<String>,
    pub title_display: String,
    pub authors_display: String,
    /// "Publisher (year)" labels, first occurrence order
    pub publishers: String,
    pub books: Vec<DuplicateBook>,
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    book_id: i64,
    title: String,
    subtitle: Option<String>,
    author_id: i64,
}

#[derive(sqlx::FromRow)]
struct DetailRow {
    book_id: i64,
    title: String,
    subtitle: Option<String>,
    year_published: Option<i64>,
    isbn: Option<String>,
    publisher_name: Option<String>,
    placement_id: Option<i64>,
    bookcase_no: Option<i64>,
    shelf_no: Option<i64>,
    sort_name: Option<String>,
    name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

struct RawGroup {
    title: String,
    subtitle: Option<String>,
    book_ids: Vec<i64>,
}

/// Groups of two or more books sharing a `dup_key`, keyed by it
async fn candidate_groups(pool: &SqlitePool) -> Result<BTreeMap<String, RawGroup>> {
    let sort_names: HashMap<i64, Option<String>> =
        sqlx::query_as::<_, (i64, Option<String>)>("SELECT author_id, sort_name FROM Authors")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    let links = sqlx::query_as::<_, LinkRow>(
        r#"
        SELECT b.book_id, b.title, b.subtitle, ba.author_id
        FROM Books b
        JOIN Books_Authors ba ON ba.book_id = b.book_id
        ORDER BY b.book_id, ba.author_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    // book_id -> (title, subtitle, author ids); insertion order kept by the ORDER BY
    let mut books: Vec<(i64, String, Option<String>, Vec<i64>)> = Vec::new();
    for link in links {
        match books.last_mut() {
            Some((id, _, _, authors)) if *id == link.book_id => authors.push(link.author_id),
            _ => books.push((link.book_id, link.title, link.subtitle, vec![link.author_id])),
        }
    }

    let mut groups: BTreeMap<String, RawGroup> = BTreeMap::new();
    for (book_id, title, subtitle, author_ids) in books {
        let parts = author_ids
            .iter()
            .map(|id| author_key_part(*id, sort_names.get(id).and_then(|s| s.as_deref())))
            .collect();
        let key = dup_key(&title, subtitle.as_deref(), parts);
        groups
            .entry(key)
            .or_insert_with(|| RawGroup {
                title,
                subtitle,
                book_ids: Vec::new(),
            })
            .book_ids
            .push(book_id);
    }
    groups.retain(|_, group| group.book_ids.len() >= 2);
    Ok(groups)
}

async fn reviews(pool: &SqlitePool) -> Result<HashMap<String, (String, Option<String>)>> {
    Ok(
        sqlx::query_as::<_, (String, String, Option<String>)>("SELECT dup_key, status, note FROM duplicate_review")
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|(key, status, note)| (key, (status, note)))
            .collect(),
    )
}

async fn book_details(pool: &SqlitePool, book_ids: &[i64]) -> Result<HashMap<i64, DuplicateBook>> {
    let mut details: HashMap<i64, DuplicateBook> = HashMap::new();
    if book_ids.is_empty() {
        return Ok(details);
    }
    let placeholders = vec!["?"; book_ids.len()].join(",");
    let sql = format!(
        r#"
        SELECT b.book_id, b.title, b.subtitle, b.year_published, b.isbn,
               p.name AS publisher_name,
               b.placement_id, pl.bookcase_no, pl.shelf_no,
               a.sort_name, a.name, a.first_name, a.last_name
        FROM Books b
        LEFT JOIN Publishers p ON p.publisher_id = b.publisher_id
        LEFT JOIN Placement pl ON pl.placement_id = b.placement_id
        JOIN Books_Authors ba ON ba.book_id = b.book_id
        JOIN Authors a ON a.author_id = ba.author_id
        WHERE b.book_id IN ({})
        ORDER BY b.book_id, ba.author_ord
        "#,
        placeholders
    );
    let mut query = sqlx::query_as::<_, DetailRow>(&sql);
    for id in book_ids {
        query = query.bind(*id);
    }

    for row in query.fetch_all(pool).await? {
        let label = format_author_label(
            row.sort_name.as_deref(),
            row.name.as_deref(),
            row.first_name.as_deref(),
            row.last_name.as_deref(),
        );
        details
            .entry(row.book_id)
            .or_insert_with(|| {
                let location = match (row.bookcase_no, row.shelf_no, row.placement_id) {
                    (Some(case), Some(shelf), _) => format!("{}/{}", case, shelf),
                    (_, _, Some(id)) => id.to_string(),
                    _ => String::new(),
                };
                DuplicateBook {
                    book_id: row.book_id,
                    title: row.title.clone(),
                    subtitle: row.subtitle.clone().unwrap_or_default(),
                    authors: Vec::new(),
                    publisher_name: row.publisher_name.clone().unwrap_or_default(),
                    year_published: row.year_published,
                    isbn: row.isbn.clone().unwrap_or_default(),
                    location,
                }
            })
            .authors
            .push(label);
    }
    Ok(details)
}

/// Build the report for a status filter, ordered for review
pub async fn load_report(pool: &SqlitePool, filter: StatusFilter) -> Result<Vec<DuplicateGroup>> {
    let groups = candidate_groups(pool).await?;
    let reviews = reviews(pool).await?;

    let mut selected: Vec<(String, RawGroup, ReviewStatus, Option<String>)> = Vec::new();
    for (key, group) in groups {
        let (status, note) = match reviews.get(&key) {
            Some((status, note)) => (ReviewStatus::parse(status).unwrap_or(ReviewStatus::New), note.clone()),
            None => (ReviewStatus::New, None),
        };
        if filter.matches(status) {
            selected.push((key, group, status, note));
        }
    }

    let ids: Vec<i64> = selected.iter().flat_map(|(_, g, _, _)| g.book_ids.iter().copied()).collect();
    let mut details = book_details(pool, &ids).await?;

    let mut report: Vec<(i64, DuplicateGroup)> = selected
        .into_iter()
        .map(|(key, group, status, note)| {
            let books: Vec<DuplicateBook> = group.book_ids.iter().filter_map(|id| details.remove(id)).collect();
            let max_year = books.iter().filter_map(|b| b.year_published).max().unwrap_or(0);
            let (title_display, authors_display) = match books.first() {
                Some(first) => (
                    format_title_display(&first.title, Some(&first.subtitle)),
                    first.authors.join("; "),
                ),
                None => (format_title_display(&group.title, group.subtitle.as_deref()), String::new()),
            };
            let mut publishers: Vec<String> = Vec::new();
            for book in &books {
                let name = book.publisher_name.trim();
                if name.is_empty() {
                    continue;
                }
                let label = match book.year_published {
                    Some(year) => format!("{} ({})", name, year),
                    None => name.to_string(),
                };
                if !publishers.contains(&label) {
                    publishers.push(label);
                }
            }
            let entry = DuplicateGroup {
                dup_key: key,
                size: group.book_ids.len(),
                status: status.as_str(),
                note,
                title_display,
                authors_display,
                publishers: publishers.join(", "),
                books,
            };
            (max_year, entry)
        })
        .collect();

    report.sort_by(|(a_year, a), (b_year, b)| {
        compare_groups((a.size, *a_year, &a.dup_key), (b.size, *b_year, &b.dup_key))
    });
    Ok(report.into_iter().map(|(_, group)| group).collect())
}

/// Record a review decision for a group
pub async fn upsert_review(pool: &SqlitePool, key: &str, status: ReviewStatus, note: Option<&str>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO duplicate_review (dup_key, status, note)
        VALUES (?, ?, ?)
        ON CONFLICT(dup_key) DO UPDATE SET
            status = excluded.status,
            note = excluded.note,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(status.as_str())
    .bind(note)
    .execute(pool)
    .await?;
    Ok(())
}
