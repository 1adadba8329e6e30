//! Shared harness for driving the router in-process.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, Request, StatusCode,
    },
    Router,
};
use device_auth_server::config::Config;
use device_auth_server::crypto::keys::{generate_key_pair, ChallengeSigner, DeviceKeyPair};
use device_auth_server::db;
use device_auth_server::state::AppState;
use secrecy::SecretString;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    /// `sid` value from `Set-Cookie`, if one was set.
    pub fn session_cookie(&self) -> Option<String> {
        let header = self.headers.get(SET_COOKIE)?.to_str().ok()?;
        let value = header.strip_prefix("sid=")?.split(';').next()?;
        Some(value.to_string())
    }

    pub fn set_cookie(&self) -> Option<&str> {
        self.headers.get(SET_COOKIE)?.to_str().ok()
    }
}

pub struct SignedIn {
    pub key: DeviceKeyPair,
    pub device_id: String,
    pub token: String,
}

fn config(secret: Option<&str>, trust_proxy: bool) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        database_max_connections: 1,
        session_secret: secret.map(|s| SecretString::from(s.to_string())),
        cookie_secure: false,
        trust_proxy,
        cleanup_interval_secs: 60,
    }
}

async fn app_with(secret: Option<&str>, trust_proxy: bool) -> TestApp {
    let config = config(secret, trust_proxy);
    let pool = db::connect(&config.database_url, config.database_max_connections)
        .await
        .expect("in-memory database");
    let state = AppState::from_pool(pool.clone(), &config).expect("state");
    TestApp {
        router: device_auth_server::router(state),
        pool,
    }
}

pub async fn app() -> TestApp {
    app_with(Some("integration-test-secret"), false).await
}

pub async fn app_without_secret() -> TestApp {
    app_with(None, false).await
}

/// An app deployed behind a proxy that sets `X-Forwarded-For`.
pub async fn app_behind_proxy() -> TestApp {
    app_with(Some("integration-test-secret"), true).await
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> Response {
        self.send(post_request(uri, body, token, None)).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(COOKIE, format!("sid={token}"));
        }
        self.send(builder.body(Body::empty()).expect("request")).await
    }

    pub async fn register(&self, key: &DeviceKeyPair) -> String {
        let response = self
            .post(
                "/api/device/register",
                json!({ "publicKeyJwk": key.public_jwk() }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body["deviceId"]
            .as_str()
            .expect("deviceId")
            .to_string()
    }

    /// Returns `(challengeId, nonce)`.
    pub async fn challenge(&self, device_id: &str) -> (String, String) {
        let response = self
            .post("/api/auth/challenge", json!({ "deviceId": device_id }), None)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        (
            response.body["challengeId"].as_str().expect("challengeId").to_string(),
            response.body["nonce"].as_str().expect("nonce").to_string(),
        )
    }

    pub async fn verify(&self, device_id: &str, challenge_id: &str, signature: &str) -> Response {
        self.post(
            "/api/auth/verify",
            json!({
                "deviceId": device_id,
                "challengeId": challenge_id,
                "signature": signature,
            }),
            None,
        )
        .await
    }

    /// Register a fresh key and complete the challenge flow.
    pub async fn sign_in(&self) -> SignedIn {
        let key = generate_key_pair();
        let device_id = self.register(&key).await;
        let (challenge_id, nonce) = self.challenge(&device_id).await;
        let response = self
            .verify(&device_id, &challenge_id, &key.sign_challenge(&nonce))
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        let token = response.session_cookie().expect("session cookie");
        SignedIn {
            key,
            device_id,
            token,
        }
    }

    pub async fn failed_attempts(&self, device_id: &str) -> i64 {
        sqlx::query_scalar("SELECT failed_attempts FROM devices WHERE id = ?")
            .bind(device_id)
            .fetch_one(&self.pool)
            .await
            .expect("device row")
    }
}

pub fn post_request(
    uri: &str,
    body: Value,
    token: Option<&str>,
    forwarded_for: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(COOKIE, format!("sid={token}"));
    }
    if let Some(ip) = forwarded_for {
        builder = builder.header("x-forwarded-for", ip);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Attach the socket peer address `axum::serve` would normally provide.
pub fn from_peer(mut request: Request<Body>, ip: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40_000))));
    request
}
