//! CSV import parsing
//!
//! Two layouts are accepted:
//! - the catalog's own export (comma or semicolon delimited, headed)
//! - the legacy `title;subtitle;year_published;authors` list, with or
//!   without a header row
//!
//! Parsing yields one outcome per data row; writing to the database is the
//! import endpoint's job.

use std::collections::HashMap;

use bookcat_common::text::{is_iso_date, normalize};

use crate::fields::parse_int;

/// Header keys of the export layout
const EXPORT_KEYS: [&str; 16] = [
    "id",
    "title",
    "subtitle",
    "series",
    "year",
    "isbn",
    "lccn",
    "publisher",
    "authors",
    "subjects",
    "loaned_to",
    "loaned_date",
    "bookcase",
    "shelf",
    "cover_image",
    "cover_filename",
];

/// Header keys of the legacy layout
const LEGACY_KEYS: [&str; 4] = ["title", "subtitle", "year_published", "authors"];

/// Minimum matching header cells to accept each layout
const EXPORT_MIN_SCORE: usize = 6;
const LEGACY_MIN_SCORE: usize = 2;

/// Import notice returned with every result
pub const FORMAT_NOTE: &str = "CSV formats: the catalog's books.csv export (comma-delimited) or legacy title;subtitle;year_published;authors (semicolon-delimited). If an ID already exists, a new ID is assigned and reported in id_conflicts.";

/// Detected file layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Export,
    Legacy,
}

/// One row ready for insertion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportRow {
    pub id: Option<i64>,
    pub title: String,
    pub subtitle: Option<String>,
    pub series: Option<String>,
    pub year: Option<i64>,
    pub isbn: Option<String>,
    pub lccn: Option<String>,
    pub notes: Option<String>,
    pub publisher: Option<String>,
    pub authors: Option<String>,
    pub subjects: Option<String>,
    pub loaned_to: Option<String>,
    pub loaned_date: Option<String>,
    /// `(bookcase_no, shelf_no)`, both positive
    pub placement: Option<(i64, i64)>,
    pub cover_filename: Option<String>,
}

/// Parse result of one data row; `line` counts data rows from 1
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Row { line: usize, row: ImportRow },
    Skipped { line: usize, error: String },
}

/// Parsed file
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub layout: Layout,
    pub delimiter: u8,
    pub has_header: bool,
    pub rows: Vec<RowOutcome>,
}

/// Lowercase, whitespace runs to `_`, drop anything outside `[a-z0-9_]`
pub fn normalize_header(cell: &str) -> String {
    let lowered = cell.trim().to_lowercase();
    let underscored = lowered.split_whitespace().collect::<Vec<_>>().join("_");
    underscored
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{FEFF}').unwrap_or(content)
}

fn reader(data: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .escape(Some(b'\\'))
        .from_reader(data.as_bytes())
}

fn header_cells(first_line: &str, delimiter: u8) -> Vec<String> {
    reader(first_line, delimiter)
        .records()
        .next()
        .and_then(|r| r.ok())
        .map(|record| record.iter().map(normalize_header).collect())
        .unwrap_or_default()
}

fn score(cells: &[String], keys: &[&str]) -> usize {
    cells.iter().filter(|c| keys.contains(&c.as_str())).count()
}

/// Pick the layout and delimiter from the first line
fn detect(first_line: &str) -> (Layout, u8, Option<Vec<String>>) {
    let comma = header_cells(first_line, b',');
    let semi = header_cells(first_line, b';');

    if score(&comma, &EXPORT_KEYS) >= EXPORT_MIN_SCORE {
        (Layout::Export, b',', Some(comma))
    } else if score(&semi, &EXPORT_KEYS) >= EXPORT_MIN_SCORE {
        (Layout::Export, b';', Some(semi))
    } else if score(&semi, &LEGACY_KEYS) >= LEGACY_MIN_SCORE {
        (Layout::Legacy, b';', Some(semi))
    } else if score(&comma, &LEGACY_KEYS) >= LEGACY_MIN_SCORE {
        (Layout::Legacy, b',', Some(comma))
    } else {
        (Layout::Legacy, b';', None)
    }
}

/// Year as an integer; blank or non-numeric reads as none
fn parse_year(value: Option<&String>) -> Option<i64> {
    value.and_then(|v| parse_int(v))
}

fn positive(value: Option<String>) -> Option<i64> {
    value.as_deref().and_then(parse_int).filter(|n| *n > 0)
}

/// Last path segment; `.` and `..` are not file names
fn basename(path: &str) -> Option<String> {
    path.rsplit(['/', '\\'])
        .next()
        .and_then(normalize)
        .filter(|name| name != "." && name != "..")
}

/// Parse the whole upload
pub fn parse(content: &str) -> ParsedCsv {
    let content = strip_bom(content);
    let first_line = content.lines().next().unwrap_or("");
    let (layout, delimiter, header) = detect(first_line);
    let has_header = header.is_some();

    let mut records = reader(content, delimiter).into_records();
    if has_header {
        let _ = records.next();
    }

    let mut rows = Vec::new();
    for (index, record) in records.enumerate() {
        let line = index + 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                rows.push(RowOutcome::Skipped { line, error: e.to_string() });
                continue;
            }
        };

        let data: HashMap<String, String> = match &header {
            Some(keys) => keys
                .iter()
                .enumerate()
                .map(|(i, key)| (key.clone(), record.get(i).unwrap_or("").to_string()))
                .collect(),
            None => LEGACY_KEYS
                .iter()
                .enumerate()
                .map(|(i, key)| (key.to_string(), record.get(i).unwrap_or("").to_string()))
                .collect(),
        };

        rows.push(parse_row(line, layout, &data));
    }

    ParsedCsv {
        layout,
        delimiter,
        has_header,
        rows,
    }
}

fn parse_row(line: usize, layout: Layout, data: &HashMap<String, String>) -> RowOutcome {
    let field = |key: &str| data.get(key).and_then(|v| normalize(v));

    let Some(title) = field("title") else {
        return RowOutcome::Skipped {
            line,
            error: "Missing title".to_string(),
        };
    };

    if layout == Layout::Legacy {
        return RowOutcome::Row {
            line,
            row: ImportRow {
                title,
                subtitle: field("subtitle"),
                year: parse_year(data.get("year_published")),
                authors: field("authors"),
                ..ImportRow::default()
            },
        };
    }

    let loaned_to = field("loaned_to");
    let loaned_date = if loaned_to.is_some() { field("loaned_date") } else { None };
    if let Some(date) = &loaned_date {
        if !is_iso_date(date) {
            return RowOutcome::Skipped {
                line,
                error: "Invalid loaned_date".to_string(),
            };
        }
    }

    let placement = match (positive(field("bookcase")), positive(field("shelf"))) {
        (Some(bookcase), Some(shelf)) => Some((bookcase, shelf)),
        _ => None,
    };

    let cover_filename = field("cover_filename")
        .as_deref()
        .and_then(basename)
        .or_else(|| field("cover_image").as_deref().and_then(basename));

    RowOutcome::Row {
        line,
        row: ImportRow {
            id: positive(field("id")),
            title,
            subtitle: field("subtitle"),
            series: field("series"),
            year: parse_year(data.get("year").or_else(|| data.get("year_published"))),
            isbn: field("isbn"),
            lccn: field("lccn"),
            notes: field("notes"),
            publisher: field("publisher"),
            authors: field("authors"),
            subjects: field("subjects"),
            loaned_to,
            loaned_date,
            placement,
            cover_filename,
        },
    }
}
