//! Query layer, one module per entity

pub mod auth_events;
pub mod authors;
pub mod backup;
pub mod books;
pub mod duplicates;
pub mod lookups;
pub mod orphans;
pub mod preferences;
pub mod sessions;
pub mod users;

/// Sort direction parsed from a `dir` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    /// `asc`/`desc` in any case; anything else gives `default`
    pub fn parse(input: Option<&str>, default: SortDir) -> Self {
        match input.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "asc" => Self::Asc,
            Some(s) if s == "desc" => Self::Desc,
            _ => default,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
