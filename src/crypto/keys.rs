//! # Device Keys and Signatures
//!
//! A device is identified by an ECDSA P-256 key pair that lives in the
//! browser. The server only ever sees the public half, as a JSON Web Key.
//!
//! ## What this module provides
//! - [`P256PublicJwk`]: a public JWK that has passed structural validation.
//!   It can only be built through [`validate_public_key_shape`] (or serde,
//!   which runs the same validation), so downstream code never handles
//!   untyped key material.
//! - [`P256PublicJwk::thumbprint`]: RFC 7638 style digest used to dedup devices
//! - [`generate_nonce`]: 32 random bytes, base64url encoded
//! - [`verify_signature`]: boolean signature check, never an error
//! - [`generate_key_pair`] / [`ChallengeSigner`]: the client half of the
//!   protocol, used by tests and any Rust client
//!
//! ## Signature format
//! Signatures are what WebCrypto's `crypto.subtle.sign({name: "ECDSA",
//! hash: "SHA-256"}, ...)` produces: the raw 64-byte `r || s` concatenation,
//! base64url encoded. The signed message is the UTF-8 bytes of the nonce
//! string exactly as the server handed it out.

use crate::crypto::{base64url, from_base64url};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of random bytes in a challenge nonce (before encoding).
pub const NONCE_BYTES: usize = 32;

const KEY_TYPE: &str = "EC";
const CURVE: &str = "P-256";
const COORDINATE_BYTES: usize = 32;

/// Why a candidate value is not an EC P-256 public JWK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyShapeError {
    #[error("public key must be a JSON object")]
    NotAnObject,
    #[error("kty must be \"EC\"")]
    WrongKeyType,
    #[error("crv must be \"P-256\"")]
    WrongCurve,
    #[error("coordinate `{0}` is missing or not a string")]
    MissingCoordinate(&'static str),
    #[error("coordinate `{0}` is not a 32-byte base64url value")]
    BadCoordinate(&'static str),
    #[error("use must be \"sig\" when present")]
    UnsupportedUse,
    #[error("key_ops must be an array of strings when present")]
    InvalidKeyOps,
    #[error("private key material must not be sent")]
    PrivateKeyMaterial,
}

/// A structurally valid EC P-256 public key in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct P256PublicJwk {
    kty: String,
    crv: String,
    x: String,
    y: String,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_ops: Option<Vec<String>>,
}

impl TryFrom<Value> for P256PublicJwk {
    type Error = KeyShapeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        validate_public_key_shape(&value)
    }
}

/// Check that `candidate` is a well-formed EC P-256 public JWK.
///
/// Only the shape is checked: key type, curve, both coordinates present and
/// 32 bytes long once decoded, and the optional `use` / `key_ops` fields
/// consistent with a verification key. No curve arithmetic happens here, so a
/// well-shaped key whose point is not on the curve passes and simply never
/// verifies anything.
pub fn validate_public_key_shape(candidate: &Value) -> Result<P256PublicJwk, KeyShapeError> {
    let obj = candidate.as_object().ok_or(KeyShapeError::NotAnObject)?;

    if obj.get("kty").and_then(Value::as_str) != Some(KEY_TYPE) {
        return Err(KeyShapeError::WrongKeyType);
    }
    if obj.get("crv").and_then(Value::as_str) != Some(CURVE) {
        return Err(KeyShapeError::WrongCurve);
    }
    if obj.contains_key("d") {
        return Err(KeyShapeError::PrivateKeyMaterial);
    }

    let x = coordinate(obj, "x")?;
    let y = coordinate(obj, "y")?;

    let key_use = match obj.get("use") {
        None | Some(Value::Null) => None,
        Some(Value::String(u)) if u == "sig" => Some(u.clone()),
        Some(_) => return Err(KeyShapeError::UnsupportedUse),
    };

    let key_ops = match obj.get("key_ops") {
        None | Some(Value::Null) => None,
        Some(Value::Array(ops)) => Some(
            ops.iter()
                .map(|op| op.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .ok_or(KeyShapeError::InvalidKeyOps)?,
        ),
        Some(_) => return Err(KeyShapeError::InvalidKeyOps),
    };

    Ok(P256PublicJwk {
        kty: KEY_TYPE.to_string(),
        crv: CURVE.to_string(),
        x,
        y,
        key_use,
        key_ops,
    })
}

fn coordinate(
    obj: &serde_json::Map<String, Value>,
    name: &'static str,
) -> Result<String, KeyShapeError> {
    let value = obj
        .get(name)
        .and_then(Value::as_str)
        .ok_or(KeyShapeError::MissingCoordinate(name))?;
    match from_base64url(value) {
        // Re-encoded so padded and unpadded spellings of one key agree
        Some(bytes) if bytes.len() == COORDINATE_BYTES => Ok(base64url(&bytes)),
        _ => Err(KeyShapeError::BadCoordinate(name)),
    }
}

impl P256PublicJwk {
    /// Deterministic digest of the canonical key fields.
    ///
    /// The members `crv`, `kty`, `x`, `y` are serialized in that
    /// (lexicographic) order with no whitespace, hashed with SHA-256 and
    /// base64url encoded, as in RFC 7638. Coordinates were validated as
    /// base64url, so no JSON escaping can occur and the output is byte-stable
    /// across processes and platforms.
    pub fn thumbprint(&self) -> String {
        let canonical = format!(
            r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
            self.crv, self.kty, self.x, self.y
        );
        base64url(&Sha256::digest(canonical.as_bytes()))
    }

    /// Import the key for verification. `None` if the point is not on the curve.
    fn verifying_key(&self) -> Option<VerifyingKey> {
        let x = from_base64url(&self.x)?;
        let y = from_base64url(&self.y)?;
        if x.len() != COORDINATE_BYTES || y.len() != COORDINATE_BYTES {
            return None;
        }
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );
        VerifyingKey::from_encoded_point(&point).ok()
    }
}

/// Generate a fresh challenge nonce: 32 bytes from the OS CSPRNG, base64url.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64url(&bytes)
}

/// Verify an ECDSA P-256/SHA-256 signature over `message`.
///
/// Any malformed input (key off the curve, signature not base64url, wrong
/// length) yields `false`. Callers cannot and should not tell those cases
/// apart from a plain wrong signature.
pub fn verify_signature(key: &P256PublicJwk, message: &[u8], signature: &str) -> bool {
    let Some(verifying_key) = key.verifying_key() else {
        return false;
    };
    let Some(raw) = from_base64url(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&raw) else {
        return false;
    };
    // WebCrypto does not normalise s; accept both halves of the curve order.
    let signature = signature.normalize_s().unwrap_or(signature);
    verifying_key.verify(message, &signature).is_ok()
}

/// Client-side key custody contract: something that holds a device private
/// key and can sign challenge nonces on demand.
pub trait ChallengeSigner {
    /// The public half, as sent to `/api/device/register`.
    fn public_jwk(&self) -> P256PublicJwk;

    /// Sign a nonce returned by `/api/auth/challenge`, producing the value
    /// expected in the `signature` field of `/api/auth/verify`.
    fn sign_challenge(&self, nonce: &str) -> String;
}

/// An in-memory P-256 key pair.
pub struct DeviceKeyPair {
    signing_key: SigningKey,
}

/// Generate a new P-256 key pair suitable for signing challenges.
pub fn generate_key_pair() -> DeviceKeyPair {
    DeviceKeyPair {
        signing_key: SigningKey::random(&mut OsRng),
    }
}

impl ChallengeSigner for DeviceKeyPair {
    fn public_jwk(&self) -> P256PublicJwk {
        // SEC1 uncompressed: 0x04 || x || y
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let bytes = point.as_bytes();
        P256PublicJwk {
            kty: KEY_TYPE.to_string(),
            crv: CURVE.to_string(),
            x: base64url(&bytes[1..1 + COORDINATE_BYTES]),
            y: base64url(&bytes[1 + COORDINATE_BYTES..]),
            key_use: None,
            key_ops: Some(vec!["verify".to_string()]),
        }
    }

    fn sign_challenge(&self, nonce: &str) -> String {
        let signature: Signature = self.signing_key.sign(nonce.as_bytes());
        base64url(&signature.to_bytes())
    }
}
