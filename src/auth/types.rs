//! # Auth API Types
//!
//! Request and response bodies for the device auth endpoints. Field names
//! are camelCase on the wire.

use crate::db::models::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// `POST /api/device/register`
///
/// The key is taken as raw JSON so that a malformed key is reported as a
/// field-level validation error rather than a generic body error.
///
/// ## Example JSON
/// ```json
/// { "publicKeyJwk": { "kty": "EC", "crv": "P-256", "x": "...", "y": "..." } }
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub public_key_jwk: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceResponse {
    pub device_id: String,
}

/// `POST /api/auth/challenge`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub device_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub challenge_id: String,
    /// Sign the UTF-8 bytes of this string, as-is.
    pub nonce: String,
}

/// `POST /api/auth/verify`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub device_id: Uuid,
    pub challenge_id: Uuid,
    /// base64url raw `r || s`
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        OkResponse { ok: true }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub ok: bool,
    pub expires_at: DateTime<Utc>,
}

/// `GET /api/me`
///
/// Anonymous callers get `{"authenticated": false}` and nothing else.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionInfo>,
}

impl MeResponse {
    pub fn anonymous() -> Self {
        MeResponse {
            authenticated: false,
            device_id: None,
            user: None,
            session_info: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// `POST /api/user/upsert`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertUserRequest {
    pub device_id: Uuid,
    pub public_id: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct UpsertUserResponse {
    pub ok: bool,
    pub user: User,
}
