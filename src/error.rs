//! # Error Handling
//!
//! This module defines the application error type and how it becomes an
//! HTTP response.
//!
//! ## Response shape
//! Every error body looks like
//! ```json
//! { "error": "device_locked", "message": "Device is locked" }
//! ```
//! `error` is a short, machine-stable reason string that clients can match
//! on. `message` is for humans. Validation and conflict errors add a
//! `details` object pointing at the offending field.
//!
//! ## What never crosses the boundary
//! Database and configuration errors are logged with full context and
//! collapsed to a generic `internal_error`. Clients never see store
//! internals.

use axum::{
    extract::rejection::JsonRejection,
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Records that can be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Device,
    Challenge,
}

impl Resource {
    fn reason(self) -> &'static str {
        match self {
            Resource::Device => "device_not_found",
            Resource::Challenge => "challenge_not_found",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Resource::Device => "Device",
            Resource::Challenge => "Challenge",
        })
    }
}

/// Why a challenge could not be consumed.
///
/// Every variant is evidence of a bad verification attempt and is charged
/// against the device by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("Challenge already consumed")]
    AlreadyConsumed,
    #[error("Challenge expired")]
    Expired,
    #[error("Challenge does not belong to device")]
    DeviceMismatch,
}

/// Why a session token did not authenticate the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("No session cookie found")]
    Missing,
    #[error("Invalid session cookie")]
    InvalidToken,
    #[error("Session not found")]
    NotFound,
    #[error("Session revoked")]
    Revoked,
    #[error("Session expired")]
    Expired,
}

/// Application-wide error type.
///
/// Handlers return `AppResult<T>` and let `?` do the conversions.
#[derive(Error, Debug)]
pub enum AppError {
    /// Store failures. Logged, then reported as a bare 500.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed input (400). `details` names the field when known.
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("{0} not found")]
    NotFound(Resource),

    /// 423: too many failed attempts.
    #[error("Device is locked")]
    DeviceLocked,

    /// 403: administratively disabled.
    #[error("Device is revoked")]
    DeviceRevoked,

    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 409: a unique field already belongs to someone else.
    #[error("{field} is already taken")]
    Conflict { field: &'static str },

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    /// Missing or unusable server configuration, e.g. no session secret.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>, field: &str, reason: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: Some(json!({ "field": field, "reason": reason.into() })),
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Validation { .. } | AppError::Challenge(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DeviceLocked => StatusCode::LOCKED,
            AppError::DeviceRevoked | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::SignatureInvalid | AppError::Session(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Machine-stable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                "internal_error"
            }
            AppError::Validation { .. } => "validation_error",
            AppError::NotFound(resource) => resource.reason(),
            AppError::DeviceLocked => "device_locked",
            AppError::DeviceRevoked => "device_revoked",
            AppError::Challenge(ChallengeError::AlreadyConsumed) => "challenge_consumed",
            AppError::Challenge(ChallengeError::Expired) => "challenge_expired",
            AppError::Challenge(ChallengeError::DeviceMismatch) => "challenge_device_mismatch",
            AppError::SignatureInvalid => "invalid_signature",
            AppError::Session(SessionError::Missing) => "session_missing",
            AppError::Session(SessionError::InvalidToken) => "session_invalid",
            AppError::Session(SessionError::NotFound) => "session_not_found",
            AppError::Session(SessionError::Revoked) => "session_revoked",
            AppError::Session(SessionError::Expired) => "session_expired",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict { .. } => "conflict",
            AppError::RateLimited { .. } => "too_many_requests",
        }
    }
}

/// Malformed JSON bodies are a 400 with the parser message attached,
/// not axum's default 422.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            message: "Invalid request data".to_string(),
            details: Some(json!({ "reason": rejection.body_text() })),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let mut body = json!({
            "error": self.reason(),
            "message": message,
        });
        match &self {
            AppError::Validation {
                details: Some(details),
                ..
            } => body["details"] = details.clone(),
            AppError::Conflict { field } => body["details"] = json!({ "field": field }),
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// Convenience alias used by every fallible operation in the crate.
pub type AppResult<T> = Result<T, AppError>;
