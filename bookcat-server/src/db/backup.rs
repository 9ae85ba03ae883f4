//! Table dumps for the full backup archive

use bookcat_common::Result;
use sqlx::SqlitePool;

/// One CSV inside the archive
#[derive(Debug, Clone)]
pub struct TableDump {
    /// Path inside the archive
    pub path: &'static str,
    pub header: &'static [&'static str],
    pub rows: Vec<Vec<String>>,
}

/// Everything the backup needs from the database
#[derive(Debug, Clone)]
pub struct BackupData {
    /// Ids of every book, ascending
    pub book_ids: Vec<i64>,
    pub books: TableDump,
    pub authors: TableDump,
    pub publishers: TableDump,
    pub subjects: TableDump,
    pub books_authors: TableDump,
    pub books_subjects: TableDump,
}

impl BackupData {
    /// Dumps in archive order
    pub fn tables(&self) -> [&TableDump; 6] {
        [
            &self.books,
            &self.authors,
            &self.publishers,
            &self.subjects,
            &self.books_authors,
            &self.books_subjects,
        ]
    }
}

pub const BOOKS_HEADER: &[&str] = &[
    "id",
    "title",
    "subtitle",
    "series",
    "year_published",
    "isbn",
    "lccn",
    "publisher",
    "loaned_to",
    "loaned_date",
    "bookcase_no",
    "shelf_no",
    "cover_image",
    "cover_file",
];

#[derive(sqlx::FromRow)]
struct BookDump {
    id: i64,
    title: String,
    subtitle: Option<String>,
    series: Option<String>,
    year_published: Option<i64>,
    isbn: Option<String>,
    lccn: Option<String>,
    publisher: Option<String>,
    loaned_to: Option<String>,
    loaned_date: Option<String>,
    bookcase_no: Option<i64>,
    shelf_no: Option<i64>,
    cover_image: Option<String>,
}

fn text(value: Option<String>) -> String {
    value.unwrap_or_default()
}

fn int(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Read every table the backup archives
pub async fn load_backup_data(pool: &SqlitePool) -> Result<BackupData> {
    let books = sqlx::query_as::<_, BookDump>(
        r#"
        SELECT b.book_id AS id, b.title, b.subtitle, b.series, b.year_published, b.isbn, b.lccn,
               p.name AS publisher, b.loaned_to, b.loaned_date,
               pl.bookcase_no, pl.shelf_no, b.cover_image
        FROM Books b
        LEFT JOIN Publishers p ON p.publisher_id = b.publisher_id
        LEFT JOIN Placement pl ON pl.placement_id = b.placement_id
        ORDER BY b.book_id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let book_ids = books.iter().map(|b| b.id).collect();
    let book_rows = books
        .into_iter()
        .map(|b| {
            let cover_file = b
                .cover_image
                .as_deref()
                .filter(|c| !c.is_empty())
                .and_then(|c| c.rsplit('/').next())
                .unwrap_or("")
                .to_string();
            vec![
                b.id.to_string(),
                b.title,
                text(b.subtitle),
                text(b.series),
                int(b.year_published),
                text(b.isbn),
                text(b.lccn),
                text(b.publisher),
                text(b.loaned_to),
                text(b.loaned_date),
                int(b.bookcase_no),
                int(b.shelf_no),
                text(b.cover_image),
                cover_file,
            ]
        })
        .collect();

    let authors = sqlx::query_as::<_, (i64, Option<String>, Option<String>, Option<String>)>(
        "SELECT author_id, first_name, last_name, sort_name FROM Authors ORDER BY author_id",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, first, last, sort)| vec![id.to_string(), text(first), text(last), text(sort)])
    .collect();

    let publishers = name_table(pool, "SELECT publisher_id, name FROM Publishers ORDER BY publisher_id").await?;
    let subjects = name_table(pool, "SELECT subject_id, name FROM Subjects ORDER BY subject_id").await?;

    let books_authors = sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT book_id, author_id, author_ord FROM Books_Authors ORDER BY book_id, author_ord",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(book, author, ord)| vec![book.to_string(), author.to_string(), ord.to_string()])
    .collect();

    let books_subjects = sqlx::query_as::<_, (i64, i64)>(
        "SELECT book_id, subject_id FROM Books_Subjects ORDER BY book_id, subject_id",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(book, subject)| vec![book.to_string(), subject.to_string()])
    .collect();

    Ok(BackupData {
        book_ids,
        books: TableDump {
            path: "data/books.csv",
            header: BOOKS_HEADER,
            rows: book_rows,
        },
        authors: TableDump {
            path: "data/authors.csv",
            header: &["author_id", "first_name", "last_name", "sort_name"],
            rows: authors,
        },
        publishers: TableDump {
            path: "data/publishers.csv",
            header: &["publisher_id", "name"],
            rows: publishers,
        },
        subjects: TableDump {
            path: "data/subjects.csv",
            header: &["subject_id", "name"],
            rows: subjects,
        },
        books_authors: TableDump {
            path: "data/Books_Authors.csv",
            header: &["book_id", "author_id", "author_ord"],
            rows: books_authors,
        },
        books_subjects: TableDump {
            path: "data/Books_Subjects.csv",
            header: &["book_id", "subject_id"],
            rows: books_subjects,
        },
    })
}

async fn name_table(pool: &SqlitePool, sql: &str) -> Result<Vec<Vec<String>>> {
    Ok(sqlx::query_as::<_, (i64, String)>(sql)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(id, name)| vec![id.to_string(), name])
        .collect())
}
