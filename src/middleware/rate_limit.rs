//! # Rate Limiting
//!
//! Fixed-window counters keyed by `client address + path`, shared by every
//! request through [`crate::state::AppState`].
//!
//! Each key gets a window that opens on its first request and lasts
//! `window`. Up to `max_requests` requests pass inside it; the rest are told
//! how long until the window closes. Counters are process-local and are
//! lost on restart.

use crate::error::AppError;
use crate::extract::ClientInfo;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct Window {
    count: u32,
    resets_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at `now`.
    ///
    /// The shard lock is held for the read-modify-write, so concurrent
    /// requests on one key never lose an increment.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window {
                count: 0,
                resets_at: now + self.window,
            });

        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = now + self.window;
        }

        if window.count >= self.max_requests {
            return RateLimitDecision::Limited {
                retry_after: window.resets_at.saturating_duration_since(now),
            };
        }

        window.count += 1;
        RateLimitDecision::Allowed
    }

    /// Drop windows that have closed. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.resets_at > now);
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Whole seconds for a `Retry-After` header, never zero.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Reject the request with 429 once its `ip:path` key is over the limit.
pub async fn rate_limit(
    State(state): State<AppState>,
    client: ClientInfo,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("{}:{}", client.ip, request.uri().path());

    match state.rate_limiter.check(&key) {
        RateLimitDecision::Allowed => Ok(next.run(request).await),
        RateLimitDecision::Limited { retry_after } => {
            tracing::warn!(%key, "Rate limit exceeded");
            Err(AppError::RateLimited {
                retry_after_secs: retry_after_secs(retry_after),
            })
        }
    }
}
