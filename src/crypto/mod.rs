//! # Cryptographic Primitives
//!
//! Everything in this module is pure: no database access, no HTTP types.
//!
//! ## Submodules
//! - `keys`: device key pairs, JWK validation, thumbprints, nonces and
//!   ECDSA P-256 signature verification
//! - `session_token`: HMAC-signed session tokens carried in the `sid` cookie

pub mod keys;
pub mod session_token;

use base64::prelude::*;

/// Encode bytes as unpadded base64url, the encoding used for every value
/// that crosses the wire (nonces, thumbprints, signatures, token tags).
pub fn base64url(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded (or padded) base64url.
pub fn from_base64url(value: &str) -> Option<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('=').as_bytes())
        .ok()
}
