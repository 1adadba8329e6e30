use crate::crypto::keys::P256PublicJwk;
use crate::db::{devices, models::Device};
use crate::error::{AppError, AppResult};
use crate::extract::ClientInfo;
use crate::state::AppState;
use serde_json::Value;

/// Register a public key, or touch the device that already owns it.
///
/// Only a structurally invalid key fails; the error names `publicKeyJwk`.
pub async fn register_device(
    state: &AppState,
    public_key_jwk: Value,
    client: &ClientInfo,
) -> AppResult<Device> {
    let key = P256PublicJwk::try_from(public_key_jwk).map_err(|e| {
        tracing::debug!(reason = %e, "Rejected public key");
        AppError::validation("Invalid public key", "publicKeyJwk", e.to_string())
    })?;

    devices::register_or_touch(&state.db, &key, &client.ip, &client.user_agent).await
}
