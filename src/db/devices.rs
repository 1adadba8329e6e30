//! # Device Registry
//!
//! Maps a public-key thumbprint to a device row and keeps the lockout
//! counter.
//!
//! ## Registration is idempotent
//! Registering a key that is already known returns the existing device and
//! only refreshes its last-seen metadata. The insert-or-fetch is a single
//! `INSERT ... ON CONFLICT DO UPDATE ... RETURNING` statement, so two
//! concurrent first registrations of the same key both get the one
//! surviving row instead of one of them hitting a duplicate-key error.
//!
//! ## Lockout
//! Each failed verification bumps `failed_attempts`; reaching
//! [`LOCKOUT_THRESHOLD`] flips an active device to `locked` in the same
//! statement. A success resets the counter.

use crate::crypto::keys::P256PublicJwk;
use crate::db::models::{Device, DeviceStatus};
use crate::db::{now, timestamp};
use crate::error::{AppError, AppResult, Resource};
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Consecutive failures that lock a device.
pub const LOCKOUT_THRESHOLD: i64 = 5;

/// Find-or-create the device for `key`, refreshing last-seen/IP/user-agent.
pub async fn register_or_touch(
    pool: &SqlitePool,
    key: &P256PublicJwk,
    ip: &str,
    user_agent: &str,
) -> AppResult<Device> {
    let candidate_id = Uuid::new_v4().to_string();
    let thumbprint = key.thumbprint();
    let now = timestamp(now());

    let device = sqlx::query_as::<_, Device>(
        "INSERT INTO devices
             (id, public_key_jwk, public_key_thumbprint, status, failed_attempts,
              created_at, last_seen_at, last_ip, user_agent)
         VALUES (?, ?, ?, 'active', 0, ?, ?, ?, ?)
         ON CONFLICT (public_key_thumbprint) DO UPDATE SET
             last_seen_at = excluded.last_seen_at,
             last_ip = excluded.last_ip,
             user_agent = excluded.user_agent
         RETURNING *",
    )
    .bind(&candidate_id)
    .bind(Json(key))
    .bind(&thumbprint)
    .bind(&now)
    .bind(&now)
    .bind(ip)
    .bind(user_agent)
    .fetch_one(pool)
    .await?;

    if device.id == candidate_id {
        tracing::info!(device_id = %device.id, %thumbprint, "Device registered");
    } else {
        tracing::debug!(device_id = %device.id, "Known device re-registered");
    }

    Ok(device)
}

pub async fn get_by_id(pool: &SqlitePool, device_id: &str) -> AppResult<Device> {
    sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
        .bind(device_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound(Resource::Device))
}

/// Charge one failed verification against the device.
///
/// Always persisted, including the increments that do not lock yet, and
/// the updated row is returned so callers can log the new state.
pub async fn record_failure(pool: &SqlitePool, device_id: &str) -> AppResult<Device> {
    let device = sqlx::query_as::<_, Device>(
        "UPDATE devices
         SET failed_attempts = failed_attempts + 1,
             status = CASE
                 WHEN status = 'active' AND failed_attempts + 1 >= ? THEN 'locked'
                 ELSE status
             END
         WHERE id = ?
         RETURNING *",
    )
    .bind(LOCKOUT_THRESHOLD)
    .bind(device_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound(Resource::Device))?;

    if device.status == DeviceStatus::Locked && device.failed_attempts == LOCKOUT_THRESHOLD {
        tracing::warn!(device_id = %device.id, "Device locked after repeated failures");
    } else {
        tracing::info!(
            device_id = %device.id,
            failed_attempts = device.failed_attempts,
            "Failed verification attempt recorded"
        );
    }

    Ok(device)
}

/// Reset the failure counter and refresh last-seen metadata.
pub async fn record_success(
    pool: &SqlitePool,
    device_id: &str,
    ip: &str,
    user_agent: &str,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE devices
         SET failed_attempts = 0, last_seen_at = ?, last_ip = ?, user_agent = ?
         WHERE id = ?",
    )
    .bind(timestamp(now()))
    .bind(ip)
    .bind(user_agent)
    .bind(device_id)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{generate_key_pair, validate_public_key_shape, ChallengeSigner};
    use crate::db::testing;

    #[tokio::test]
    async fn registering_twice_returns_same_device() {
        let pool = testing::pool().await;
        let key = generate_key_pair().public_jwk();

        let first = register_or_touch(&pool, &key, "10.0.0.1", "ua/1").await.unwrap();
        let second = register_or_touch(&pool, &key, "10.0.0.2", "ua/2").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, DeviceStatus::Active);
        assert_eq!(second.failed_attempts, 0);
        assert_eq!(second.last_ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(second.user_agent.as_deref(), Some("ua/2"));
        assert_eq!(second.created_at, first.created_at);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn padded_and_unpadded_key_share_one_device() {
        let pool = testing::pool().await;
        let pair = generate_key_pair();
        let mut padded = serde_json::to_value(pair.public_jwk()).unwrap();
        for name in ["x", "y"] {
            let unpadded = padded[name].as_str().unwrap().to_string();
            padded[name] = serde_json::json!(format!("{unpadded}="));
        }
        let padded = validate_public_key_shape(&padded).unwrap();

        let first = register_or_touch(&pool, &pair.public_jwk(), "10.0.0.1", "ua")
            .await
            .unwrap();
        let second = register_or_touch(&pool, &padded, "10.0.0.1", "ua").await.unwrap();
        assert_eq!(first.id, second.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn concurrent_registration_creates_one_device() {
        let pool = testing::pool().await;
        let key = generate_key_pair().public_jwk();

        let attempts = (0..8).map(|i| {
            let pool = pool.clone();
            let key = key.clone();
            tokio::spawn(async move {
                register_or_touch(&pool, &key, &format!("10.0.0.{i}"), "ua").await
            })
        });
        let mut ids = Vec::new();
        for handle in attempts {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_devices() {
        let pool = testing::pool().await;
        let a = register_or_touch(&pool, &generate_key_pair().public_jwk(), "ip", "ua")
            .await
            .unwrap();
        let b = register_or_touch(&pool, &generate_key_pair().public_jwk(), "ip", "ua")
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn stored_key_round_trips() {
        let pool = testing::pool().await;
        let key = generate_key_pair().public_jwk();
        let device = register_or_touch(&pool, &key, "ip", "ua").await.unwrap();
        let loaded = get_by_id(&pool, &device.id).await.unwrap();
        assert_eq!(loaded.public_key_jwk.0, key);
        assert_eq!(loaded.public_key_thumbprint, key.thumbprint());
    }

    #[tokio::test]
    async fn missing_device_is_not_found() {
        let pool = testing::pool().await;
        let err = get_by_id(&pool, "no-such-device").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(Resource::Device)));
        let err = record_failure(&pool, "no-such-device").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(Resource::Device)));
    }

    #[tokio::test]
    async fn fifth_failure_locks_device() {
        let pool = testing::pool().await;
        let key = generate_key_pair().public_jwk();
        let device = register_or_touch(&pool, &key, "ip", "ua").await.unwrap();

        for attempt in 1..LOCKOUT_THRESHOLD {
            let updated = record_failure(&pool, &device.id).await.unwrap();
            assert_eq!(updated.failed_attempts, attempt);
            assert_eq!(updated.status, DeviceStatus::Active);
        }

        let locked = record_failure(&pool, &device.id).await.unwrap();
        assert_eq!(locked.failed_attempts, LOCKOUT_THRESHOLD);
        assert_eq!(locked.status, DeviceStatus::Locked);
        assert!(matches!(locked.ensure_active(), Err(AppError::DeviceLocked)));

        // Re-registering the key does not unlock it.
        let again = register_or_touch(&pool, &key, "ip", "ua").await.unwrap();
        assert_eq!(again.status, DeviceStatus::Locked);
    }

    #[tokio::test]
    async fn success_resets_counter() {
        let pool = testing::pool().await;
        let device = register_or_touch(&pool, &generate_key_pair().public_jwk(), "ip", "ua")
            .await
            .unwrap();

        record_failure(&pool, &device.id).await.unwrap();
        record_failure(&pool, &device.id).await.unwrap();
        record_success(&pool, &device.id, "10.1.1.1", "ua/ok").await.unwrap();

        let device = get_by_id(&pool, &device.id).await.unwrap();
        assert_eq!(device.failed_attempts, 0);
        assert_eq!(device.last_ip.as_deref(), Some("10.1.1.1"));
        assert_eq!(device.user_agent.as_deref(), Some("ua/ok"));
    }

    #[tokio::test]
    async fn revoked_device_stays_revoked_on_failure() {
        let pool = testing::pool().await;
        let device = register_or_touch(&pool, &generate_key_pair().public_jwk(), "ip", "ua")
            .await
            .unwrap();
        sqlx::query("UPDATE devices SET status = 'revoked' WHERE id = ?")
            .bind(&device.id)
            .execute(&pool)
            .await
            .unwrap();

        for _ in 0..LOCKOUT_THRESHOLD {
            record_failure(&pool, &device.id).await.unwrap();
        }
        let device = get_by_id(&pool, &device.id).await.unwrap();
        assert_eq!(device.status, DeviceStatus::Revoked);
        assert!(matches!(device.ensure_active(), Err(AppError::DeviceRevoked)));
    }
}
