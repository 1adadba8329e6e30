use crate::auth::cookie::{clear_session_cookie, extract_session_token, session_cookie};
use crate::auth::types::*;
use crate::auth::{authentication, session};
use crate::error::AppResult;
use crate::extract::{AppJson, ClientInfo};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderName, HeaderValue},
    Json,
};

/// A JSON body plus one `Set-Cookie` header.
type WithCookie<T> = ([(HeaderName, HeaderValue); 1], Json<T>);

pub async fn challenge(
    State(state): State<AppState>,
    AppJson(req): AppJson<ChallengeRequest>,
) -> AppResult<Json<ChallengeResponse>> {
    let challenge = authentication::issue_challenge(&state, &req.device_id.to_string()).await?;

    Ok(Json(ChallengeResponse {
        challenge_id: challenge.id,
        nonce: challenge.nonce,
    }))
}

pub async fn verify(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(req): AppJson<VerifyRequest>,
) -> AppResult<WithCookie<OkResponse>> {
    let issued = authentication::verify_challenge(&state, &req, &client).await?;
    let cookie = session_cookie(&issued.token, state.cookie_secure)?;

    Ok(([(SET_COOKIE, cookie)], Json(OkResponse::ok())))
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<WithCookie<RefreshResponse>> {
    let token = extract_session_token(&headers);
    let refreshed = session::refresh(&state, token.as_deref()).await?;
    let cookie = session_cookie(&refreshed.token, state.cookie_secure)?;

    Ok((
        [(SET_COOKIE, cookie)],
        Json(RefreshResponse {
            ok: true,
            expires_at: refreshed.expires_at,
        }),
    ))
}

/// Always 200 with the cookie cleared, whatever happened to the revoke.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> WithCookie<OkResponse> {
    let token = extract_session_token(&headers);
    session::logout(&state, token.as_deref()).await;

    (
        [(SET_COOKIE, clear_session_cookie(state.cookie_secure))],
        Json(OkResponse::ok()),
    )
}
