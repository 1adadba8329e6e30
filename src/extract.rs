//! # Request Extractors
//!
//! - [`AppJson`]: `axum::Json` whose rejections become [`AppError`], so a
//!   malformed body is a 400 `validation_error` with the usual error shape.
//! - [`ClientInfo`]: caller address and user agent, recorded on devices and
//!   sessions and used as the rate-limit key. The address is the socket
//!   peer unless the deployment trusts its proxy's `X-Forwarded-For`.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequest, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

const UNKNOWN: &str = "unknown";

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

#[async_trait]
impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let connect_info = parts.extensions.get::<ConnectInfo<SocketAddr>>();
        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        Ok(ClientInfo {
            ip: client_ip(&parts.headers, connect_info, state.trust_proxy),
            user_agent,
        })
    }
}

/// The socket peer, or the first `X-Forwarded-For` hop when `trust_proxy`
/// is set. `"unknown"` when neither is available.
///
/// Without a trusted proxy the header is ignored: any client can write it.
pub fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> String {
    let forwarded = trust_proxy
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (forwarded, connect_info) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => UNKNOWN.to_string(),
    }
}
