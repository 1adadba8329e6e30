//! # User Handlers
//!
//! The identity check and the profile upsert.

use crate::auth::cookie::extract_session_token;
use crate::auth::session;
use crate::auth::types::{MeResponse, UpsertUserRequest, UpsertUserResponse};
use crate::error::AppResult;
use crate::extract::AppJson;
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Json};

/// Who is the caller?
///
/// ## Route
/// GET /api/me
///
/// ## Response
/// ```json
/// {
///   "authenticated": true,
///   "deviceId": "550e8400-e29b-41d4-a716-446655440000",
///   "user": { "publicId": "RDO-ABCDE-FGHJ", "displayName": "brave-otter" },
///   "sessionInfo": { "createdAt": "...", "expiresAt": "..." }
/// }
/// ```
/// or `{"authenticated": false}` for a missing, forged, expired or revoked
/// session. Not an error.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<MeResponse>> {
    let token = extract_session_token(&headers);
    Ok(Json(session::whoami(&state, token.as_deref()).await?))
}

/// Create or update the caller's public profile.
///
/// ## Route
/// POST /api/user/upsert
///
/// Behind the edge gate, but the session is checked against the ledger here
/// as well. A `publicId` or `displayName` owned by another device is a 409.
pub async fn upsert(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<UpsertUserRequest>,
) -> AppResult<Json<UpsertUserResponse>> {
    let token = extract_session_token(&headers);
    let current = session::authenticate(&state, token.as_deref()).await?;
    let user = session::upsert_profile(&state, &current, &req).await?;

    Ok(Json(UpsertUserResponse { ok: true, user }))
}
