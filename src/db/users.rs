//! # User Profiles
//!
//! One optional profile per device. `public_id` and `display_name` are
//! unique across all users.

use crate::db::models::User;
use crate::db::{now, timestamp};
use crate::error::{AppError, AppResult};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Create or update the profile attached to `device_id`.
///
/// A `public_id` or `display_name` already owned by another device is a
/// `Conflict` naming the field; the other device's row is left untouched.
pub async fn upsert(
    pool: &SqlitePool,
    device_id: &str,
    public_id: &str,
    display_name: &str,
) -> AppResult<User> {
    let now = timestamp(now());

    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, device_id, public_id, display_name, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (device_id) DO UPDATE SET
             public_id = excluded.public_id,
             display_name = excluded.display_name,
             updated_at = excluded.updated_at
         RETURNING *",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(device_id)
    .bind(public_id)
    .bind(display_name)
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            let field = if db.message().contains("display_name") {
                "displayName"
            } else if db.message().contains("public_id") {
                "publicId"
            } else {
                "deviceId"
            };
            tracing::info!(device_id = %device_id, field, "Profile upsert conflict");
            AppError::Conflict { field }
        }
        _ => AppError::Database(e),
    })
}

pub async fn find_by_device(pool: &SqlitePool, device_id: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE device_id = ?")
        .bind(device_id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}
