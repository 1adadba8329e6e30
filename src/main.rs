//! # Device Authentication Server
//!
//! Entry point: logging, configuration, state, the cleanup task and the
//! HTTP listener. The routes live in [`device_auth_server::router`].

use device_auth_server::config::Config;
use device_auth_server::db::{challenges, sessions};
use device_auth_server::state::AppState;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,device_auth_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    if app_state.session_codec.is_none() {
        tracing::warn!("SESSION_SECRET is not set; session routes will answer 500");
    }
    tracing::info!("Application state initialized");

    // Expired challenges, sessions and rate-limit windows
    let cleanup_state = app_state.clone();
    let cleanup_every = Duration::from_secs(config.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        loop {
            interval.tick().await;
            match challenges::purge_expired(&cleanup_state.db).await {
                Ok(n) if n > 0 => tracing::debug!(purged = n, "Expired challenges removed"),
                Ok(_) => {}
                Err(e) => tracing::error!("Challenge cleanup failed: {:?}", e),
            }
            match sessions::purge_expired(&cleanup_state.db).await {
                Ok(n) if n > 0 => tracing::debug!(purged = n, "Expired sessions removed"),
                Ok(_) => {}
                Err(e) => tracing::error!("Session cleanup failed: {:?}", e),
            }
            cleanup_state.rate_limiter.purge_expired(Instant::now());
        }
    });

    let app = device_auth_server::router(app_state);

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
