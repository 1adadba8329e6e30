//! # Device Authentication Server
//!
//! Passwordless, device-bound authentication. A browser holds an ECDSA
//! P-256 key pair; the server knows only the public key. Signing a
//! single-use challenge proves possession and earns a short-lived session,
//! carried in a signed `sid` cookie.
//!
//! ## Modules
//! - `crypto`: key validation, thumbprints, nonces, signatures, session tokens
//! - `db`: device registry, challenge and session ledgers, user profiles
//! - `auth`: the protocol state machine
//! - `middleware`: edge gate (rate limit, token tag check)
//! - `handlers`: HTTP endpoints
//! - `config`, `state`, `error`, `extract`: plumbing

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod state;

use crate::handlers::{auth as auth_handlers, device, health::health_check, users};
use crate::middleware::{auth::require_session_token, rate_limit::rate_limit};
use crate::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the full application router.
///
/// ```text
/// GET  /health
/// POST /api/device/register   rate limited
/// POST /api/auth/challenge    rate limited
/// POST /api/auth/verify       rate limited
/// POST /api/auth/refresh      rate limited
/// POST /api/auth/logout
/// GET  /api/me
/// POST /api/user/upsert       edge gate
/// ```
pub fn router(state: AppState) -> Router {
    let rate_limited = Router::new()
        .route("/device/register", post(device::register))
        .route("/auth/challenge", post(auth_handlers::challenge))
        .route("/auth/verify", post(auth_handlers::verify))
        .route("/auth/refresh", post(auth_handlers::refresh))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), rate_limit));

    let gated = Router::new()
        .route("/user/upsert", post(users::upsert))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_session_token,
        ));

    let api = Router::new()
        .route("/me", get(users::me))
        .route("/auth/logout", post(auth_handlers::logout))
        .merge(rate_limited)
        .merge(gated);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
