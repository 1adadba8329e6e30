//! # HTTP Request Handlers
//!
//! Thin axum handlers: pull what they need out of the request, call into
//! [`crate::auth`], shape the response.
//!
//! ## Submodules
//! - `health`: liveness probe
//! - `device`: device key registration
//! - `auth`: challenge, verify, refresh, logout
//! - `users`: identity check and profile upsert

pub mod auth;
pub mod device;
pub mod health;
pub mod users;
