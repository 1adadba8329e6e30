//! # Challenge Ledger
//!
//! Issues short-lived nonces bound to one device and enforces that each is
//! consumed at most once, before it expires, by the device it was issued to.
//!
//! ## Serialization point
//! Two verifications racing on the same challenge are settled by
//! `UPDATE ... WHERE consumed_at IS NULL`: exactly one statement changes a
//! row. The other sees zero rows affected and reports `AlreadyConsumed`.

use crate::crypto::keys::generate_nonce;
use crate::db::models::{Challenge, Device};
use crate::db::{now, timestamp};
use crate::error::{AppError, AppResult, ChallengeError, Resource};
use chrono::Duration;
use sqlx::SqlitePool;
use uuid::Uuid;

/// How long a nonce stays signable.
pub const CHALLENGE_TTL_SECS: i64 = 120;

/// Issue a fresh challenge for an active device.
///
/// A locked or revoked device gets the device-status error, not a
/// challenge error.
pub async fn issue(pool: &SqlitePool, device: &Device) -> AppResult<Challenge> {
    device.ensure_active()?;

    let created_at = now();
    let challenge = Challenge {
        id: Uuid::new_v4().to_string(),
        device_id: device.id.clone(),
        nonce: generate_nonce(),
        created_at,
        expires_at: created_at + Duration::seconds(CHALLENGE_TTL_SECS),
        consumed_at: None,
    };

    sqlx::query(
        "INSERT INTO challenges (id, device_id, nonce, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&challenge.id)
    .bind(&challenge.device_id)
    .bind(&challenge.nonce)
    .bind(timestamp(challenge.created_at))
    .bind(timestamp(challenge.expires_at))
    .execute(pool)
    .await?;

    tracing::debug!(device_id = %device.id, challenge_id = %challenge.id, "Challenge issued");

    Ok(challenge)
}

pub async fn get_by_id(pool: &SqlitePool, challenge_id: &str) -> AppResult<Challenge> {
    sqlx::query_as::<_, Challenge>("SELECT * FROM challenges WHERE id = ?")
        .bind(challenge_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound(Resource::Challenge))
}

/// Consume `challenge` on behalf of `device_id` and hand back its nonce.
///
/// Checks, in order: already consumed, expired, issued to another device.
/// The consumed stamp is then applied atomically; losing that race is also
/// `AlreadyConsumed`. A failed consume leaves the row untouched.
pub async fn consume(pool: &SqlitePool, challenge: &Challenge, device_id: &str) -> AppResult<String> {
    if challenge.consumed_at.is_some() {
        return Err(ChallengeError::AlreadyConsumed.into());
    }
    let now = now();
    if now > challenge.expires_at {
        return Err(ChallengeError::Expired.into());
    }
    if challenge.device_id != device_id {
        return Err(ChallengeError::DeviceMismatch.into());
    }

    let result = sqlx::query(
        "UPDATE challenges SET consumed_at = ? WHERE id = ? AND consumed_at IS NULL",
    )
    .bind(timestamp(now))
    .bind(&challenge.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ChallengeError::AlreadyConsumed.into());
    }

    Ok(challenge.nonce.clone())
}

/// Delete challenges past their expiry, consumed or not.
pub async fn purge_expired(pool: &SqlitePool) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM challenges WHERE expires_at < ?")
        .bind(timestamp(now()))
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{generate_key_pair, ChallengeSigner};
    use crate::db::{devices, testing};

    async fn device(pool: &SqlitePool) -> Device {
        devices::register_or_touch(pool, &generate_key_pair().public_jwk(), "ip", "ua")
            .await
            .unwrap()
    }

    async fn backdate(pool: &SqlitePool, challenge_id: &str) {
        sqlx::query("UPDATE challenges SET expires_at = ? WHERE id = ?")
            .bind(timestamp(now() - Duration::seconds(1)))
            .bind(challenge_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn issued_challenge_expires_in_two_minutes() {
        let pool = testing::pool().await;
        let device = device(&pool).await;
        let challenge = issue(&pool, &device).await.unwrap();

        assert_eq!(
            challenge.expires_at - challenge.created_at,
            Duration::seconds(CHALLENGE_TTL_SECS)
        );
        let stored = get_by_id(&pool, &challenge.id).await.unwrap();
        assert_eq!(stored.nonce, challenge.nonce);
        assert_eq!(stored.expires_at, challenge.expires_at);
        assert!(stored.consumed_at.is_none());
    }

    #[tokio::test]
    async fn locked_device_gets_no_challenge() {
        let pool = testing::pool().await;
        let device = device(&pool).await;
        for _ in 0..devices::LOCKOUT_THRESHOLD {
            devices::record_failure(&pool, &device.id).await.unwrap();
        }
        let device = devices::get_by_id(&pool, &device.id).await.unwrap();
        assert!(matches!(issue(&pool, &device).await, Err(AppError::DeviceLocked)));
    }

    #[tokio::test]
    async fn challenge_is_single_use() {
        let pool = testing::pool().await;
        let device = device(&pool).await;
        let challenge = issue(&pool, &device).await.unwrap();

        let nonce = consume(&pool, &challenge, &device.id).await.unwrap();
        assert_eq!(nonce, challenge.nonce);

        // Stale copy loses the atomic update.
        let err = consume(&pool, &challenge, &device.id).await.unwrap_err();
        assert!(matches!(err, AppError::Challenge(ChallengeError::AlreadyConsumed)));

        // Fresh copy is rejected up front.
        let reloaded = get_by_id(&pool, &challenge.id).await.unwrap();
        assert!(reloaded.consumed_at.is_some());
        let err = consume(&pool, &reloaded, &device.id).await.unwrap_err();
        assert!(matches!(err, AppError::Challenge(ChallengeError::AlreadyConsumed)));
    }

    #[tokio::test]
    async fn expired_challenge_cannot_be_consumed() {
        let pool = testing::pool().await;
        let device = device(&pool).await;
        let challenge = issue(&pool, &device).await.unwrap();
        backdate(&pool, &challenge.id).await;

        let challenge = get_by_id(&pool, &challenge.id).await.unwrap();
        let err = consume(&pool, &challenge, &device.id).await.unwrap_err();
        assert!(matches!(err, AppError::Challenge(ChallengeError::Expired)));
    }

    #[tokio::test]
    async fn challenge_is_bound_to_its_device() {
        let pool = testing::pool().await;
        let owner = device(&pool).await;
        let intruder = device(&pool).await;
        let challenge = issue(&pool, &owner).await.unwrap();

        let err = consume(&pool, &challenge, &intruder.id).await.unwrap_err();
        assert!(matches!(err, AppError::Challenge(ChallengeError::DeviceMismatch)));

        // The mismatch did not burn the challenge for its owner.
        assert!(consume(&pool, &challenge, &owner.id).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_consumers_have_one_winner() {
        let pool = testing::pool().await;
        let device = device(&pool).await;
        let challenge = issue(&pool, &device).await.unwrap();

        let (a, b) = tokio::join!(
            consume(&pool, &challenge, &device.id),
            consume(&pool, &challenge, &device.id)
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let pool = testing::pool().await;
        let device = device(&pool).await;
        let stale = issue(&pool, &device).await.unwrap();
        let fresh = issue(&pool, &device).await.unwrap();
        backdate(&pool, &stale.id).await;

        assert_eq!(purge_expired(&pool).await.unwrap(), 1);
        assert!(matches!(
            get_by_id(&pool, &stale.id).await,
            Err(AppError::NotFound(Resource::Challenge))
        ));
        assert!(get_by_id(&pool, &fresh.id).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_challenge_is_not_found() {
        let pool = testing::pool().await;
        assert!(matches!(
            get_by_id(&pool, "missing").await,
            Err(AppError::NotFound(Resource::Challenge))
        ));
    }
}
