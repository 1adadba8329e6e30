//! # Health Check Handler
//!
//! Liveness endpoint for load balancers and monitoring.

use axum::Json;
use serde_json::{json, Value};

/// ## Route
/// GET /health
///
/// ## Response
/// ```json
/// { "status": "healthy", "service": "device-auth-server" }
/// ```
///
/// Does not touch the database.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "device-auth-server"
    }))
}
