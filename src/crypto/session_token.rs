//! # Session Tokens
//!
//! The `sid` cookie carries `<session id>.<tag>`, where `tag` is
//! `base64url(HMAC-SHA256(secret, session id))`.
//!
//! Tamper detection needs no storage: a token whose tag does not match is
//! rejected before the session table is ever queried. Only a token with a
//! valid tag costs a lookup, and only that lookup can tell whether the
//! session is still alive.

use crate::crypto::{base64url, from_base64url};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Separator between the session id and its tag.
pub const SEPARATOR: char = '.';

const TAG_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum SessionTokenError {
    #[error("session secret is empty")]
    EmptySecret,
    #[error("session secret cannot key HMAC-SHA256")]
    InvalidKey,
}

/// Signs and verifies session tokens with a server-held secret.
///
/// The keyed MAC is built once and cloned per operation.
#[derive(Clone)]
pub struct SessionCodec {
    mac: HmacSha256,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}

impl SessionCodec {
    pub fn new(secret: &SecretString) -> Result<Self, SessionTokenError> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(SessionTokenError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SessionTokenError::InvalidKey)?;
        Ok(Self { mac })
    }

    fn tag(&self, session_id: &str) -> [u8; TAG_BYTES] {
        let mut mac = self.mac.clone();
        mac.update(session_id.as_bytes());
        let mut tag = [0u8; TAG_BYTES];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Produce `session_id + "." + tag`.
    pub fn sign(&self, session_id: &str) -> String {
        format!("{session_id}{SEPARATOR}{}", base64url(&self.tag(session_id)))
    }

    /// Return the embedded session id if, and only if, the tag matches.
    ///
    /// Malformed input (no separator, empty id or tag, undecodable or
    /// wrong-length tag) is `None`, same as a forged tag. The tag comparison
    /// runs over the full 32 bytes regardless of where the first mismatch is.
    pub fn verify(&self, token: &str) -> Option<String> {
        let (session_id, tag) = token.split_once(SEPARATOR)?;
        if session_id.is_empty() || tag.is_empty() {
            return None;
        }
        let provided = from_base64url(tag)?;
        if provided.len() != TAG_BYTES {
            return None;
        }
        let expected = self.tag(session_id);
        if bool::from(expected[..].ct_eq(&provided)) {
            Some(session_id.to_string())
        } else {
            None
        }
    }
}
