//! # Configuration Management
//!
//! Configuration comes from the environment (12-factor style). A `.env`
//! file is loaded first if present.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_URL`: SQLite connection string
//! - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
//! - `SESSION_SECRET`: HMAC key for the `sid` cookie (no default)
//! - `APP_ENV`: `production` marks the session cookie `Secure`
//! - `COOKIE_SECURE`: explicit override for the `Secure` attribute
//! - `TRUST_PROXY`: take the client address from `X-Forwarded-For` (default: false)
//! - `CLEANUP_INTERVAL_SECS`: how often expired rows are purged (default: 60)

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::env;

/// Application configuration.
///
/// `Debug` is safe to log: the session secret prints as redacted.
#[derive(Debug)]
pub struct Config {
    /// Server host/IP address to bind to
    pub host: String,

    /// Server port number
    pub port: u16,

    /// SQLite database connection URL.
    /// `mode=rwc` means read, write, create if missing.
    pub database_url: String,

    pub database_max_connections: u32,

    /// Key for signing session tokens.
    ///
    /// Optional at start-up: without it the server still runs, but every
    /// route that mints or verifies a session cookie fails with a 500.
    pub session_secret: Option<SecretString>,

    /// Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,

    /// Whether the first `X-Forwarded-For` hop names the client. Only set
    /// this behind a reverse proxy that overwrites the header; otherwise
    /// the socket peer is used.
    pub trust_proxy: bool,

    /// Seconds between purges of expired challenges, sessions and
    /// rate-limit windows.
    pub cleanup_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails only when a variable is present but unparseable
    /// (e.g. `PORT=eighty`).
    pub fn from_env() -> Result<Self> {
        // dotenvy doesn't error if the file is missing
        dotenvy::dotenv().ok();

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let cookie_secure = match env::var("COOKIE_SECURE") {
            Ok(value) => parse_bool(&value).context("COOKIE_SECURE must be true or false")?,
            Err(_) => app_env.eq_ignore_ascii_case("production"),
        };

        let trust_proxy = match env::var("TRUST_PROXY") {
            Ok(value) => parse_bool(&value).context("TRUST_PROXY must be true or false")?,
            Err(_) => false,
        };

        let session_secret = env::var("SESSION_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:device_auth.db?mode=rwc".to_string()),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            session_secret,
            cookie_secure,
            trust_proxy,
            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("CLEANUP_INTERVAL_SECS must be a positive integer")?,
        })
    }

    /// Socket address to bind, e.g. "127.0.0.1:8080".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
