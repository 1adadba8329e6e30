//! # Application State
//!
//! Shared resources handed to every handler and middleware. Axum clones the
//! state per request, so everything in it is either a cheap handle
//! (`SqlitePool`) or behind an `Arc`.

use crate::config::Config;
use crate::crypto::session_token::SessionCodec;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::middleware::rate_limit::RateLimiter;
use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,

    /// `None` when no session secret is configured. Routes that mint or
    /// verify cookies then answer 500.
    pub session_codec: Option<SessionCodec>,

    /// Whether issued cookies carry `Secure`
    pub cookie_secure: bool,

    /// Take the client address from `X-Forwarded-For` instead of the peer
    pub trust_proxy: bool,

    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Connect to the database, run migrations and build the session codec.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::connect(&config.database_url, config.database_max_connections)
            .await
            .context("failed to open database")?;

        Self::from_pool(db, config)
    }

    /// Build state around an existing pool (migrations already applied).
    pub fn from_pool(db: SqlitePool, config: &Config) -> Result<Self> {
        let session_codec = config
            .session_secret
            .as_ref()
            .map(SessionCodec::new)
            .transpose()
            .context("invalid SESSION_SECRET")?;

        Ok(AppState {
            db,
            session_codec,
            cookie_secure: config.cookie_secure,
            trust_proxy: config.trust_proxy,
            rate_limiter: Arc::new(RateLimiter::default()),
        })
    }

    /// The codec, or a configuration error if no secret was provided.
    pub fn session_codec(&self) -> AppResult<&SessionCodec> {
        self.session_codec
            .as_ref()
            .ok_or_else(|| AppError::Config("SESSION_SECRET is not set".to_string()))
    }
}
