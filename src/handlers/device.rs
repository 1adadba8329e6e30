use crate::auth::registration;
use crate::auth::types::{RegisterDeviceRequest, RegisterDeviceResponse};
use crate::error::AppResult;
use crate::extract::{AppJson, ClientInfo};
use crate::state::AppState;
use axum::{extract::State, Json};

/// Register a device public key.
///
/// ## Route
/// POST /api/device/register
///
/// Registering a key twice returns the same `deviceId`.
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(req): AppJson<RegisterDeviceRequest>,
) -> AppResult<Json<RegisterDeviceResponse>> {
    let device = registration::register_device(&state, req.public_key_jwk, &client).await?;

    Ok(Json(RegisterDeviceResponse { device_id: device.id }))
}
