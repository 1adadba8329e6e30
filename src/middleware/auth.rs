use crate::auth::cookie::extract_session_token;
use crate::error::{AppError, AppResult, SessionError};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Let a request through only if it carries a `sid` token with a valid tag.
///
/// No database access: a revoked or expired session with an intact tag
/// passes here. Handlers behind this layer still check the session ledger.
pub async fn require_session_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    let token = extract_session_token(request.headers()).ok_or(SessionError::Missing)?;

    if state.session_codec()?.verify(&token).is_none() {
        tracing::debug!(path = %request.uri().path(), "Edge gate rejected session token");
        return Err(AppError::Session(SessionError::InvalidToken));
    }

    Ok(next.run(request).await)
}
