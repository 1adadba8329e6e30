//! # Database Models
//!
//! Structs that map to table rows. Each derives `sqlx::FromRow` so queries
//! can use `query_as`.
//!
//! ## Ownership
//! `Device` is the root entity. A `Challenge` or `Session` always belongs to
//! exactly one device and means nothing without it. A `User` is an optional
//! profile hanging off a device.
//!
//! ## Timestamps
//! Stored as RFC 3339 text (see [`crate::db::timestamp`]) and decoded back
//! into `DateTime<Utc>`.

use crate::crypto::keys::P256PublicJwk;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Lifecycle state of a device.
///
/// - `Active`: normal
/// - `Locked`: too many failed verifications; every attempt is refused
/// - `Revoked`: administratively disabled, no way back inside this service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Locked,
    Revoked,
}

/// A registered public key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Device {
    /// UUID v4, assigned on first registration
    pub id: String,

    /// The public key, re-validated on every decode
    pub public_key_jwk: Json<P256PublicJwk>,

    /// Unique across all devices; the dedup key for registration
    pub public_key_thumbprint: String,

    pub status: DeviceStatus,

    /// Consecutive failed verifications since the last success
    pub failed_attempts: i64,

    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Device {
    /// Refuse anything but an active device, with the status-specific error.
    pub fn ensure_active(&self) -> AppResult<()> {
        match self.status {
            DeviceStatus::Active => Ok(()),
            DeviceStatus::Locked => Err(AppError::DeviceLocked),
            DeviceStatus::Revoked => Err(AppError::DeviceRevoked),
        }
    }
}

/// A single-use nonce handed to a device.
///
/// ## Lifecycle
/// 1. Issued with a 2 minute expiry
/// 2. Stamped `consumed_at` exactly once during verification, whether or
///    not the signature then checks out
/// 3. Purged by the cleanup task once past `expires_at`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Challenge {
    pub id: String,
    pub device_id: String,

    /// 32 random bytes, base64url. The device signs this string.
    pub nonce: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Server-side session referenced by the signed `sid` cookie.
///
/// A session that is revoked or past `expires_at` authorizes nothing, even
/// while the row still exists.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Public profile. `public_id` and `display_name` are globally unique.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip)]
    pub id: String,
    #[serde(skip)]
    pub device_id: String,
    pub public_id: String,
    pub display_name: String,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}
