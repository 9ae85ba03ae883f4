//! User accounts

use bookcat_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

/// Account roles
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_READER: &str = "reader";

pub fn is_valid_role(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_READER
}

/// Row of the user admin list
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub is_active: i64,
    pub created_at: Option<String>,
    pub last_login: Option<String>,
}

/// Credentials and flags checked at login
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserAuth {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: i64,
    pub force_password_change: i64,
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<UserRow>> {
    Ok(sqlx::query_as::<_, UserRow>(
        "SELECT user_id, username, role, is_active, created_at, last_login FROM Users ORDER BY username",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<UserAuth>> {
    Ok(sqlx::query_as::<_, UserAuth>(
        r#"
        SELECT user_id, username, password_hash, role, is_active, force_password_change
        FROM Users WHERE username = ? LIMIT 1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?)
}

pub async fn find_by_id(pool: &SqlitePool, user_id: i64) -> Result<Option<UserAuth>> {
    Ok(sqlx::query_as::<_, UserAuth>(
        r#"
        SELECT user_id, username, password_hash, role, is_active, force_password_change
        FROM Users WHERE user_id = ? LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn username_exists(pool: &SqlitePool, username: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT user_id FROM Users WHERE username = ? LIMIT 1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Insert an active user; returns the id
pub async fn create_user(pool: &SqlitePool, username: &str, password_hash: &str, role: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO Users (username, password_hash, role, is_active) VALUES (?, ?, ?, 1)")
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Set role and/or active flag
pub async fn update_user(
    pool: &SqlitePool,
    user_id: i64,
    role: Option<&str>,
    is_active: Option<bool>,
) -> Result<()> {
    let mut assignments = Vec::new();
    if role.is_some() {
        assignments.push("role = ?");
    }
    if is_active.is_some() {
        assignments.push("is_active = ?");
    }
    if assignments.is_empty() {
        return Ok(());
    }
    let sql = format!("UPDATE Users SET {} WHERE user_id = ?", assignments.join(", "));
    let mut query = sqlx::query(&sql);
    if let Some(role) = role {
        query = query.bind(role);
    }
    if let Some(active) = is_active {
        query = query.bind(active);
    }
    query.bind(user_id).execute(pool).await?;
    Ok(())
}

pub async fn delete_user(pool: &SqlitePool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM Users WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Store a new hash and set or clear the forced-change flag
pub async fn set_password(pool: &SqlitePool, user_id: i64, password_hash: &str, force_change: bool) -> Result<()> {
    sqlx::query("UPDATE Users SET password_hash = ?, force_password_change = ? WHERE user_id = ?")
        .bind(password_hash)
        .bind(force_change)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_last_login(pool: &SqlitePool, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE Users SET last_login = CURRENT_TIMESTAMP WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_active_admins(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM Users WHERE role = 'admin' AND is_active = 1")
        .fetch_one(pool)
        .await?)
}

pub async fn count_admins(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM Users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?)
}
