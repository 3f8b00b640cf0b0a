use chrono::{Duration, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePool;

use crate::models::User;

/// Persists a session token valid for `ttl_hours`
pub async fn create_session(
    token: &str,
    user_id: i64,
    ttl_hours: i64,
    pool: &SqlitePool,
) -> sqlx::Result<()> {
    let now = Utc::now();
    let expires = now + Duration::hours(ttl_hours);

    sqlx::query(
        "INSERT INTO sessions (token, user_id, created_time, expires_time) VALUES (?, ?, ?, ?)",
    )
    .bind(token)
    .bind(user_id)
    .bind(now.to_rfc3339_opts(SecondsFormat::Millis, true))
    .bind(expires.to_rfc3339_opts(SecondsFormat::Millis, true))
    .execute(pool)
    .await?;

    Ok(())
}

/// Resolves a token to its user. Expired tokens are deleted and yield `None`.
pub async fn fetch_session_user(token: &str, pool: &SqlitePool) -> sqlx::Result<Option<User>> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT user_id, expires_time FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(pool)
            .await?;

    let Some((user_id, expires_time)) = row else {
        return Ok(None);
    };

    let now = crate::create_timestamp();
    if expires_time <= now {
        log::debug!("Session for user {user_id} expired at {expires_time}");
        delete_session(token, pool).await?;
        return Ok(None);
    }

    super::fetch_user(user_id, pool).await
}

pub async fn delete_session(token: &str, pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn purge_expired_sessions(pool: &SqlitePool) -> sqlx::Result<u64> {
    let purged = sqlx::query("DELETE FROM sessions WHERE expires_time <= ?")
        .bind(crate::create_timestamp())
        .execute(pool)
        .await?
        .rows_affected();

    Ok(purged)
}
