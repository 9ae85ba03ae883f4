//! Authentication audit log

use bookcat_common::text::truncate_bytes;
use bookcat_common::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::pagination::Pagination;

const MAX_USERNAME_BYTES: usize = 190;
const MAX_USER_AGENT_BYTES: usize = 512;
const MAX_EVENT_TYPE_BYTES: usize = 32;

/// Retention windows accepted by the purge endpoint
pub const PURGE_MONTHS: [i64; 2] = [6, 12];

/// One event to record
#[derive(Debug, Clone, Default)]
pub struct NewAuthEvent<'a> {
    pub event_type: &'a str,
    pub user_id: Option<i64>,
    pub username: Option<&'a str>,
    pub ip_address: &'a str,
    pub user_agent: Option<&'a str>,
    pub details: Option<Value>,
}

pub async fn insert_event(pool: &SqlitePool, event: &NewAuthEvent<'_>) -> Result<()> {
    let details = event
        .details
        .as_ref()
        .filter(|d| d.as_object().map_or(true, |m| !m.is_empty()))
        .map(Value::to_string);
    let user_agent = event
        .user_agent
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .map(|ua| truncate_bytes(ua, MAX_USER_AGENT_BYTES));

    sqlx::query(
        r#"
        INSERT INTO AuthEvents (user_id, username_snapshot, event_type, ip_address, user_agent, details)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.user_id)
    .bind(truncate_bytes(event.username.unwrap_or(""), MAX_USERNAME_BYTES))
    .bind(truncate_bytes(event.event_type, MAX_EVENT_TYPE_BYTES))
    .bind(event.ip_address)
    .bind(user_agent)
    .bind(details)
    .execute(pool)
    .await?;
    Ok(())
}

/// List filters; empty strings and non-positive ids are ignored
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub user_id: Option<i64>,
    pub q: Option<String>,
}

impl EventFilter {
    fn where_sql(&self) -> (String, Vec<EventParam>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if let Some(event_type) = self.event_type.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("event_type = ?");
            params.push(EventParam::Text(event_type.to_string()));
        }
        if let Some(user_id) = self.user_id.filter(|id| *id > 0) {
            clauses.push("user_id = ?");
            params.push(EventParam::Int(user_id));
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("(username_snapshot LIKE ? OR event_type LIKE ? OR ip_address LIKE ?)");
            let like = format!("%{}%", q);
            for _ in 0..3 {
                params.push(EventParam::Text(like.clone()));
            }
        }
        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

enum EventParam {
    Text(String),
    Int(i64),
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    user_id: Option<i64>,
    username_snapshot: Option<String>,
    event_type: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    details: Option<String>,
    created_at: String,
}

/// Event as listed for admins, with `details` decoded
#[derive(Debug, Clone, Serialize)]
pub struct AuthEvent {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username_snapshot: String,
    pub event_type: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub details: Option<Value>,
    pub created_at: String,
}

impl From<EventRow> for AuthEvent {
    fn from(row: EventRow) -> Self {
        let details = row
            .details
            .as_deref()
            .filter(|d| !d.is_empty())
            .and_then(|d| serde_json::from_str::<Value>(d).ok())
            .filter(|v| v.is_object() || v.is_array());
        Self {
            id: row.id,
            user_id: row.user_id,
            username_snapshot: row.username_snapshot.unwrap_or_default(),
            event_type: row.event_type,
            ip_address: row.ip_address.unwrap_or_default(),
            user_agent: row.user_agent,
            details,
            created_at: row.created_at,
        }
    }
}

/// Newest first; returns the page and the filtered total
pub async fn list_events(
    pool: &SqlitePool,
    filter: &EventFilter,
    pagination: Pagination,
) -> Result<(Vec<AuthEvent>, i64)> {
    let (where_sql, params) = filter.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM AuthEvents {}", where_sql);
    let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count = match param {
            EventParam::Text(s) => count.bind(s.as_str()),
            EventParam::Int(i) => count.bind(*i),
        };
    }
    let total = count.fetch_one(pool).await?;

    let sql = format!(
        r#"
        SELECT id, user_id, username_snapshot, event_type, ip_address, user_agent, details, created_at
        FROM AuthEvents
        {}
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );
    let mut query = sqlx::query_as::<_, EventRow>(&sql);
    for param in &params {
        query = match param {
            EventParam::Text(s) => query.bind(s.as_str()),
            EventParam::Int(i) => query.bind(*i),
        };
    }
    let rows = query
        .bind(pagination.per_page)
        .bind(pagination.offset)
        .fetch_all(pool)
        .await?;

    Ok((rows.into_iter().map(AuthEvent::from).collect(), total))
}

/// Delete events older than `months`; returns the number removed
pub async fn purge_older_than(pool: &SqlitePool, months: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM AuthEvents WHERE created_at < datetime('now', ?)")
        .bind(format!("-{} months", months))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
