//! Per-user display preferences

use bookcat_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

pub const DEFAULT_TEXT_SIZE: &str = "medium";
pub const DEFAULT_PER_PAGE: i64 = 25;
pub const TEXT_SIZES: [&str; 3] = ["small", "medium", "large"];

/// Column toggles with their defaults
pub const SHOW_FLAGS: [(&str, bool); 13] = [
    ("show_cover", true),
    ("show_subtitle", true),
    ("show_series", true),
    ("show_is_hungarian", true),
    ("show_publisher", true),
    ("show_year", true),
    ("show_status", true),
    ("show_placement", true),
    ("show_isbn", false),
    ("show_loaned_to", false),
    ("show_loaned_date", false),
    ("show_subjects", false),
    ("show_notes", false),
];

/// Preferences as returned to the frontend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preferences {
    pub logo_url: Option<String>,
    pub bg_color: Option<String>,
    pub fg_color: Option<String>,
    pub text_size: String,
    pub per_page: i64,
    pub show_cover: bool,
    pub show_subtitle: bool,
    pub show_series: bool,
    pub show_is_hungarian: bool,
    pub show_publisher: bool,
    pub show_year: bool,
    pub show_status: bool,
    pub show_placement: bool,
    pub show_isbn: bool,
    pub show_loaned_to: bool,
    pub show_loaned_date: bool,
    pub show_subjects: bool,
    pub show_notes: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self::from(PreferencesRow::default())
    }
}

#[derive(Debug, Default, sqlx::FromRow)]
struct PreferencesRow {
    logo_path: Option<String>,
    bg_color: Option<String>,
    fg_color: Option<String>,
    text_size: Option<String>,
    per_page: Option<i64>,
    show_cover: Option<bool>,
    show_subtitle: Option<bool>,
    show_series: Option<bool>,
    show_is_hungarian: Option<bool>,
    show_publisher: Option<bool>,
    show_year: Option<bool>,
    show_status: Option<bool>,
    show_placement: Option<bool>,
    show_isbn: Option<bool>,
    show_loaned_to: Option<bool>,
    show_loaned_date: Option<bool>,
    show_subjects: Option<bool>,
    show_notes: Option<bool>,
}

impl From<PreferencesRow> for Preferences {
    fn from(row: PreferencesRow) -> Self {
        let logo_url = row
            .logo_path
            .map(|p| p.trim().trim_start_matches('/').to_string())
            .filter(|p| !p.is_empty());
        let per_page = match row.per_page {
            Some(n) if n >= 1 => n,
            _ => DEFAULT_PER_PAGE,
        };
        Self {
            logo_url,
            bg_color: row.bg_color,
            fg_color: row.fg_color,
            text_size: row.text_size.unwrap_or_else(|| DEFAULT_TEXT_SIZE.to_string()),
            per_page,
            show_cover: row.show_cover.unwrap_or(true),
            show_subtitle: row.show_subtitle.unwrap_or(true),
            show_series: row.show_series.unwrap_or(true),
            show_is_hungarian: row.show_is_hungarian.unwrap_or(true),
            show_publisher: row.show_publisher.unwrap_or(true),
            show_year: row.show_year.unwrap_or(true),
            show_status: row.show_status.unwrap_or(true),
            show_placement: row.show_placement.unwrap_or(true),
            show_isbn: row.show_isbn.unwrap_or(false),
            show_loaned_to: row.show_loaned_to.unwrap_or(false),
            show_loaned_date: row.show_loaned_date.unwrap_or(false),
            show_subjects: row.show_subjects.unwrap_or(false),
            show_notes: row.show_notes.unwrap_or(false),
        }
    }
}

/// Partial update; `None` leaves the stored value alone.
///
/// For the nullable text columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct PreferencesUpdate {
    pub logo_path: Option<Option<String>>,
    pub bg_color: Option<Option<String>>,
    pub fg_color: Option<Option<String>>,
    pub text_size: Option<String>,
    pub per_page: Option<i64>,
    /// `(column, value)`; columns come from [`SHOW_FLAGS`]
    pub flags: Vec<(&'static str, bool)>,
}

impl PreferencesUpdate {
    pub fn is_empty(&self) -> bool {
        self.logo_path.is_none()
            && self.bg_color.is_none()
            && self.fg_color.is_none()
            && self.text_size.is_none()
            && self.per_page.is_none()
            && self.flags.is_empty()
    }
}

pub async fn fetch_preferences(pool: &SqlitePool, user_id: i64) -> Result<Preferences> {
    let row = sqlx::query_as::<_, PreferencesRow>(
        r#"
        SELECT logo_path, bg_color, fg_color, text_size, per_page,
               show_cover, show_subtitle, show_series, show_is_hungarian,
               show_publisher, show_year, show_status, show_placement,
               show_isbn, show_loaned_to, show_loaned_date, show_subjects, show_notes
        FROM UserPreferences
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Preferences::from).unwrap_or_default())
}

/// Create the default row when the user has none
pub async fn ensure_preferences_row(pool: &SqlitePool, user_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO UserPreferences (user_id) VALUES (?)")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Apply the supplied keys only; missing rows start from the defaults
pub async fn update_preferences(pool: &SqlitePool, user_id: i64, update: &PreferencesUpdate) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("INSERT OR IGNORE INTO UserPreferences (user_id) VALUES (?)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let mut assignments: Vec<String> = Vec::new();
    let mut texts: Vec<Option<String>> = Vec::new();
    for (column, value) in [
        ("logo_path", &update.logo_path),
        ("bg_color", &update.bg_color),
        ("fg_color", &update.fg_color),
    ] {
        if let Some(value) = value {
            assignments.push(format!("{} = ?", column));
            texts.push(value.clone());
        }
    }
    if let Some(size) = &update.text_size {
        assignments.push("text_size = ?".to_string());
        texts.push(Some(size.clone()));
    }

    let mut ints: Vec<i64> = Vec::new();
    if let Some(per_page) = update.per_page {
        assignments.push("per_page = ?".to_string());
        ints.push(per_page);
    }
    for (column, value) in &update.flags {
        // Column names are only ever taken from the whitelist
        if SHOW_FLAGS.iter().any(|(known, _)| known == column) {
            assignments.push(format!("{} = ?", column));
            ints.push(i64::from(*value));
        }
    }

    if !assignments.is_empty() {
        let sql = format!(
            "UPDATE UserPreferences SET {}, updated_at = CURRENT_TIMESTAMP WHERE user_id = ?",
            assignments.join(", ")
        );
        let mut query = sqlx::query(&sql);
        for text in texts {
            query = query.bind(text);
        }
        for int in ints {
            query = query.bind(int);
        }
        query.bind(user_id).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (tempfile::TempDir, SqlitePool, i64) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = bookcat_common::db::init_database(&tmp.path().join("test.db"))
            .await
            .unwrap();
        let uid = sqlx::query("INSERT INTO Users (username, password_hash) VALUES ('ann', 'x')")
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_rowid();
        (tmp, pool, uid)
    }

    #[test]
    fn test_defaults() {
        let prefs = Preferences::default();
        assert_eq!(prefs.text_size, "medium");
        assert_eq!(prefs.per_page, 25);
        assert!(prefs.show_cover && prefs.show_placement);
        assert!(!prefs.show_isbn && !prefs.show_notes);
        assert!(prefs.logo_url.is_none());
    }

    #[test]
    fn test_logo_url_strips_leading_slash() {
        let row = PreferencesRow {
            logo_path: Some("/user-assets/1/logo.png".into()),
            per_page: Some(0),
            ..Default::default()
        };
        let prefs = Preferences::from(row);
        assert_eq!(prefs.logo_url.as_deref(), Some("user-assets/1/logo.png"));
        assert_eq!(prefs.per_page, 25);
    }

    #[tokio::test]
    async fn test_missing_row_gives_defaults() {
        let (_tmp, pool, uid) = setup().await;
        assert_eq!(fetch_preferences(&pool, uid).await.unwrap(), Preferences::default());
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_values() {
        let (_tmp, pool, uid) = setup().await;
        let first = PreferencesUpdate {
            bg_color: Some(Some("#ffffff".into())),
            per_page: Some(50),
            ..Default::default()
        };
        update_preferences(&pool, uid, &first).await.unwrap();

        let second = PreferencesUpdate {
            flags: vec![("show_isbn", true), ("show_cover", false)],
            ..Default::default()
        };
        update_preferences(&pool, uid, &second).await.unwrap();

        let prefs = fetch_preferences(&pool, uid).await.unwrap();
        assert_eq!(prefs.bg_color.as_deref(), Some("#ffffff"));
        assert_eq!(prefs.per_page, 50);
        assert!(prefs.show_isbn);
        assert!(!prefs.show_cover);

        let clear = PreferencesUpdate {
            bg_color: Some(None),
            ..Default::default()
        };
        update_preferences(&pool, uid, &clear).await.unwrap();
        assert!(fetch_preferences(&pool, uid).await.unwrap().bg_color.is_none());
    }
}
