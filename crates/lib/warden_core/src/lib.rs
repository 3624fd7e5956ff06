//! # warden_core
//!
//! Session and token lifecycle for Warden: credential hashing, JWT
//! issuance and rotation, multi-device sessions, revocation, password reset
//! and request-time authentication.

pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
