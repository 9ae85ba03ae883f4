//! Login sessions
//!
//! The browser holds a random token; the database only ever sees its
//! SHA-256, so a leaked database cannot be replayed as cookies.
//!
//! A session lapses once it has been idle longer than the configured
//! timeout; lapsed rows are deleted when they are next presented and by
//! [`purge_expired`].

use bookcat_common::Result;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::debug;

/// Session owner as recorded at login
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionRecord {
    pub user_id: i64,
    pub username: String,
    pub role: String,
}

/// 32 random bytes, hex encoded
pub fn new_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Stored form of a token
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Open a session; returns the raw token for the cookie
pub async fn create_session(pool: &SqlitePool, user_id: i64, username: &str, role: &str) -> Result<String> {
    let token = new_token();
    sqlx::query("INSERT INTO Sessions (token_hash, user_id, username, role) VALUES (?, ?, ?, ?)")
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(username)
        .bind(role)
        .execute(pool)
        .await?;
    Ok(token)
}

/// SQLite `datetime('now', ?)` modifier for the idle cutoff
fn idle_cutoff(idle_minutes: u64) -> String {
    format!("-{} minutes", idle_minutes)
}

/// Look up a live token and touch its `last_seen`
pub async fn find_session(pool: &SqlitePool, token: &str, idle_minutes: u64) -> Result<Option<SessionRecord>> {
    let token_hash = hash_token(token);
    let expired = sqlx::query("DELETE FROM Sessions WHERE token_hash = ? AND last_seen < datetime('now', ?)")
        .bind(&token_hash)
        .bind(idle_cutoff(idle_minutes))
        .execute(pool)
        .await?
        .rows_affected();
    if expired > 0 {
        debug!("Session lapsed after {} idle minutes", idle_minutes);
        return Ok(None);
    }

    let record = sqlx::query_as::<_, SessionRecord>(
        "SELECT user_id, username, role FROM Sessions WHERE token_hash = ?",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    if record.is_some() {
        sqlx::query("UPDATE Sessions SET last_seen = CURRENT_TIMESTAMP WHERE token_hash = ?")
            .bind(&token_hash)
            .execute(pool)
            .await?;
    }
    Ok(record)
}

/// Delete every session idle longer than the timeout
pub async fn purge_expired(pool: &SqlitePool, idle_minutes: u64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM Sessions WHERE last_seen < datetime('now', ?)")
        .bind(idle_cutoff(idle_minutes))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM Sessions WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(pool)
        .await?;
    Ok(())
}

/// Drop every session of a user (disabled account, password reset)
pub async fn delete_user_sessions(pool: &SqlitePool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM Sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Keep session role/username in step with the Users row
pub async fn refresh_user_sessions(pool: &SqlitePool, user_id: i64, role: &str) -> Result<()> {
    sqlx::query("UPDATE Sessions SET role = ? WHERE user_id = ?")
        .bind(role)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = new_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, new_token());
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = hash_token("abc");
        assert_eq!(hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    const IDLE: u64 = 24;

    async fn setup() -> (tempfile::TempDir, SqlitePool, i64) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = bookcat_common::db::init_database(&tmp.path().join("test.db"))
            .await
            .unwrap();
        let user_id = sqlx::query("INSERT INTO Users (username, password_hash, role) VALUES ('ann', 'x', 'admin')")
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_rowid();
        (tmp, pool, user_id)
    }

    async fn age_session(pool: &SqlitePool, token: &str, last_seen: &str) {
        sqlx::query("UPDATE Sessions SET created_at = ?1, last_seen = ?1 WHERE token_hash = ?2")
            .bind(last_seen)
            .bind(hash_token(token))
            .execute(pool)
            .await
            .unwrap();
    }

    async fn session_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM Sessions")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (_tmp, pool, user_id) = setup().await;

        let token = create_session(&pool, user_id, "ann", "admin").await.unwrap();
        let record = find_session(&pool, &token, IDLE).await.unwrap().unwrap();
        assert_eq!(record.username, "ann");
        assert_eq!(record.role, "admin");
        assert!(find_session(&pool, "not-a-token", IDLE).await.unwrap().is_none());

        refresh_user_sessions(&pool, user_id, "reader").await.unwrap();
        assert_eq!(find_session(&pool, &token, IDLE).await.unwrap().unwrap().role, "reader");

        delete_session(&pool, &token).await.unwrap();
        assert!(find_session(&pool, &token, IDLE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idle_session_lapses_and_is_deleted() {
        let (_tmp, pool, user_id) = setup().await;
        let token = create_session(&pool, user_id, "ann", "admin").await.unwrap();
        age_session(&pool, &token, "2000-01-01 00:00:00").await;

        assert!(find_session(&pool, &token, IDLE).await.unwrap().is_none());
        assert_eq!(session_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_recent_activity_keeps_session() {
        let (_tmp, pool, user_id) = setup().await;
        let token = create_session(&pool, user_id, "ann", "admin").await.unwrap();
        sqlx::query("UPDATE Sessions SET last_seen = datetime('now', '-10 minutes')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(find_session(&pool, &token, IDLE).await.unwrap().is_some());
        assert!(find_session(&pool, &token, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_sessions() {
        let (_tmp, pool, user_id) = setup().await;
        let stale = create_session(&pool, user_id, "ann", "admin").await.unwrap();
        let live = create_session(&pool, user_id, "ann", "admin").await.unwrap();
        age_session(&pool, &stale, "2000-01-01 00:00:00").await;

        assert_eq!(purge_expired(&pool, IDLE).await.unwrap(), 1);
        assert_eq!(session_count(&pool).await, 1);
        assert!(find_session(&pool, &live, IDLE).await.unwrap().is_some());
    }
}
