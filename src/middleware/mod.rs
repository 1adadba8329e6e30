//! # Middleware Module
//!
//! The edge gate that runs in front of the handlers:
//! - `rate_limit`: fixed-window limit per client address and path
//! - `auth`: session token tag check, no database access

pub mod auth;
pub mod rate_limit;
