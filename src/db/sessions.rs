//! # Session Ledger
//!
//! Sessions live 15 minutes. A refresh moves the expiry to now + 15
//! minutes. It does not add to the remaining time. Revocation stamps
//! `revoked_at` and is idempotent, so logout can always claim success.

use crate::db::models::Session;
use crate::db::{now, timestamp};
use crate::error::{AppResult, SessionError};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Session lifetime, also used as the cookie `Max-Age`.
pub const SESSION_TTL_SECS: i64 = 900;

pub async fn create(
    pool: &SqlitePool,
    device_id: &str,
    ip: &str,
    user_agent: &str,
) -> AppResult<Session> {
    let created_at = now();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        device_id: device_id.to_string(),
        created_at,
        expires_at: created_at + Duration::seconds(SESSION_TTL_SECS),
        revoked_at: None,
        ip: Some(ip.to_string()),
        user_agent: Some(user_agent.to_string()),
    };

    sqlx::query(
        "INSERT INTO sessions (id, device_id, created_at, expires_at, ip, user_agent)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&session.id)
    .bind(&session.device_id)
    .bind(timestamp(session.created_at))
    .bind(timestamp(session.expires_at))
    .bind(&session.ip)
    .bind(&session.user_agent)
    .execute(pool)
    .await?;

    tracing::info!(device_id = %device_id, session_id = %session.id, "Session issued");

    Ok(session)
}

/// Load a session that is still usable.
///
/// Fails with `NotFound`, `Revoked` or `Expired`, checked in that order.
pub async fn get(pool: &SqlitePool, session_id: &str) -> AppResult<Session> {
    let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?
        .ok_or(SessionError::NotFound)?;

    if session.revoked_at.is_some() {
        return Err(SessionError::Revoked.into());
    }
    if now() > session.expires_at {
        return Err(SessionError::Expired.into());
    }

    Ok(session)
}

/// Refresh: move the expiry to now + TTL and return it.
///
/// The session keeps its id. The update re-checks revocation, so a logout
/// racing with a refresh cannot be undone by it.
pub async fn touch(pool: &SqlitePool, session_id: &str) -> AppResult<DateTime<Utc>> {
    let session = get(pool, session_id).await?;
    let expires_at = now() + Duration::seconds(SESSION_TTL_SECS);

    let result = sqlx::query(
        "UPDATE sessions SET expires_at = ? WHERE id = ? AND revoked_at IS NULL",
    )
    .bind(timestamp(expires_at))
    .bind(&session.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SessionError::Revoked.into());
    }

    tracing::debug!(session_id = %session.id, %expires_at, "Session refreshed");

    Ok(expires_at)
}

/// Revoke a session. Revoking twice, or revoking an unknown id, is fine.
pub async fn revoke(pool: &SqlitePool, session_id: &str) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE sessions SET revoked_at = COALESCE(revoked_at, ?) WHERE id = ?",
    )
    .bind(timestamp(now()))
    .bind(session_id)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        tracing::info!(session_id = %session_id, "Session revoked");
    }

    Ok(())
}

/// Delete sessions past their expiry, revoked or not.
pub async fn purge_expired(pool: &SqlitePool) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(timestamp(now()))
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
