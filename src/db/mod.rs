//! # Database Module
//!
//! One submodule per table:
//! - `models`: row types (Device, Challenge, Session, User)
//! - `devices`: the device registry (dedup by thumbprint, lockout counter)
//! - `challenges`: single-use nonces
//! - `sessions`: issue, extend and revoke sessions
//! - `users`: optional public profile attached to a device
//!
//! ## Atomicity
//! Every invariant is scoped to one row, so every mutation is one SQL
//! statement. No multi-statement transactions are needed anywhere.

pub mod challenges;
pub mod devices;
pub mod models;
pub mod sessions;
pub mod users;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Open a pool and bring the schema up to date.
///
/// An in-memory database lives and dies with its connection, so for
/// `sqlite::memory:` URLs connections are never recycled.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
    if database_url.contains(":memory:") {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await?;

    // Embedded from ./migrations at compile time
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Fixed-width RFC 3339 (`2024-01-15T10:30:00.000Z`), so that comparing the
/// stored text in SQL orders the same way as comparing the instants.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time truncated to what the database stores.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::parse_from_rfc3339(&timestamp(now))
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or(now)
}
