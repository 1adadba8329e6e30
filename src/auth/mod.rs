//! # Device Authentication
//!
//! The protocol state machine, per device:
//!
//! ```text
//! Unregistered -> Registered -> ChallengeIssued -> Verified | Rejected
//! ```
//!
//! ## Submodules
//! - `registration`: submit a public key, get a device id
//! - `authentication`: issue a challenge, verify its signature, open a session
//! - `session`: refresh, logout, identity check and profile updates
//! - `cookie`: the `sid` cookie format
//! - `types`: request and response bodies
//!
//! ## Flow
//! 1. Client generates a P-256 key pair and registers the public half
//! 2. Client asks for a challenge for its device id
//! 3. Client signs the nonce with its private key
//! 4. Server consumes the challenge, checks the signature, and on success
//!    opens a session and sets the `sid` cookie
//! 5. Later requests present the cookie; protected routes check the session
//!    in the ledger, not just the cookie tag
//!
//! ## Lockout
//! Every failed verify (bad signature, or a consumed, expired or foreign
//! challenge) charges the device one attempt. Five in a row lock it.

pub mod authentication;
pub mod cookie;
pub mod registration;
pub mod session;
pub mod types;
