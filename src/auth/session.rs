//! Everything that starts from a presented session token: refresh, logout,
//! the identity check and profile updates.

use crate::auth::types::{MeResponse, SessionInfo, UpsertUserRequest};
use crate::db::models::{Session, User};
use crate::db::{devices, sessions, users};
use crate::error::{AppError, AppResult, SessionError};
use crate::state::AppState;
use chrono::{DateTime, Utc};

#[derive(Debug)]
pub struct RefreshedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Resolve a token to a live session: presence, then the tag, then the ledger.
pub async fn authenticate(state: &AppState, token: Option<&str>) -> AppResult<Session> {
    let token = token.ok_or(SessionError::Missing)?;
    let session_id = state
        .session_codec()?
        .verify(token).ok_or(SessionError::InvalidToken)?;
    sessions::get(&state.db, &session_id).await
}

/// Push the session expiry out to now + TTL and re-sign the same id.
pub async fn refresh(state: &AppState, token: Option<&str>) -> AppResult<RefreshedSession> {
    let session = authenticate(state, token).await?;
    let expires_at = sessions::touch(&state.db, &session.id).await?;
    let token = state.session_codec()?.sign(&session.id);

    Ok(RefreshedSession { token, expires_at })
}

/// Revoke whatever session the token names. Never fails; problems are logged.
pub async fn logout(state: &AppState, token: Option<&str>) {
    let Some(token) = token else {
        return;
    };
    let Some(codec) = state.session_codec.as_ref() else {
        tracing::warn!("Logout without a session secret; cookie cleared only");
        return;
    };
    let Some(session_id) = codec.verify(token) else {
        tracing::debug!("Logout with an invalid session token");
        return;
    };
    if let Err(e) = sessions::revoke(&state.db, &session_id).await {
        tracing::error!(session_id = %session_id, "Failed to revoke session: {e}");
    }
}

/// Who is calling. Anything short of a live session is simply anonymous.
pub async fn whoami(state: &AppState, token: Option<&str>) -> AppResult<MeResponse> {
    let session = match authenticate(state, token).await {
        Ok(session) => session,
        Err(AppError::Session(reason)) => {
            tracing::debug!(%reason, "Anonymous identity check");
            return Ok(MeResponse::anonymous());
        }
        Err(e) => return Err(e),
    };

    let user = users::find_by_device(&state.db, &session.device_id).await?;

    Ok(MeResponse {
        authenticated: true,
        device_id: Some(session.device_id),
        user,
        session_info: Some(SessionInfo {
            created_at: session.created_at,
            expires_at: session.expires_at,
        }),
    })
}

/// Create or update the caller's profile.
///
/// The body names the device explicitly and it has to be the session's own.
pub async fn upsert_profile(
    state: &AppState,
    session: &Session,
    request: &UpsertUserRequest,
) -> AppResult<User> {
    let public_id = request.public_id.trim();
    let display_name = request.display_name.trim();
    if public_id.is_empty() {
        return Err(AppError::validation(
            "publicId is required",
            "publicId",
            "must not be empty",
        ));
    }
    if display_name.is_empty() {
        return Err(AppError::validation(
            "displayName is required",
            "displayName",
            "must not be empty",
        ));
    }

    let device_id = request.device_id.to_string();
    if device_id != session.device_id {
        tracing::warn!(
            session_device = %session.device_id,
            requested_device = %device_id,
            "Profile update for another device refused"
        );
        return Err(AppError::Forbidden(
            "deviceId does not match the session".to_string(),
        ));
    }
    let device = devices::get_by_id(&state.db, &device_id).await?;

    users::upsert(&state.db, &device.id, public_id, display_name).await
}
