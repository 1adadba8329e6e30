//! Challenge issuance and the verify step of the protocol.

use crate::auth::types::VerifyRequest;
use crate::crypto::keys::verify_signature;
use crate::db::models::{Challenge, Session};
use crate::db::{challenges, devices, sessions};
use crate::error::{AppError, AppResult};
use crate::extract::ClientInfo;
use crate::state::AppState;

/// A freshly minted session and the signed token for its cookie.
#[derive(Debug)]
pub struct IssuedSession {
    pub session: Session,
    pub token: String,
}

pub async fn issue_challenge(state: &AppState, device_id: &str) -> AppResult<Challenge> {
    let device = devices::get_by_id(&state.db, device_id).await?;
    challenges::issue(&state.db, &device).await
}

/// Verify a signed challenge and open a session.
///
/// Every failure past the device-status check costs the device one attempt,
/// and the charge is written before the error is returned. The challenge is
/// consumed before the signature is looked at.
pub async fn verify_challenge(
    state: &AppState,
    request: &VerifyRequest,
    client: &ClientInfo,
) -> AppResult<IssuedSession> {
    let codec = state.session_codec()?;
    let device_id = request.device_id.to_string();
    let challenge_id = request.challenge_id.to_string();

    let (device, challenge) = tokio::try_join!(
        devices::get_by_id(&state.db, &device_id),
        challenges::get_by_id(&state.db, &challenge_id),
    )?;

    // Locked and revoked devices are refused without a further charge
    device.ensure_active()?;

    let nonce = match challenges::consume(&state.db, &challenge, &device.id).await {
        Ok(nonce) => nonce,
        Err(err @ AppError::Challenge(_)) => {
            tracing::info!(
                device_id = %device.id,
                challenge_id = %challenge.id,
                reason = err.reason(),
                "Challenge rejected"
            );
            devices::record_failure(&state.db, &device.id).await?;
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    if !verify_signature(&device.public_key_jwk, nonce.as_bytes(), &request.signature) {
        tracing::info!(device_id = %device.id, challenge_id = %challenge.id, "Signature rejected");
        devices::record_failure(&state.db, &device.id).await?;
        return Err(AppError::SignatureInvalid);
    }

    devices::record_success(&state.db, &device.id, &client.ip, &client.user_agent).await?;
    let session = sessions::create(&state.db, &device.id, &client.ip, &client.user_agent).await?;
    let token = codec.sign(&session.id);

    Ok(IssuedSession { session, token })
}
