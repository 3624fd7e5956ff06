//! Authentication and session lifecycle.
//!
//! Credential hashing, token signing, the session service that owns every
//! state transition, and the per-request authenticator.

pub mod device;
pub mod guard;
pub mod jwt;
pub mod notifier;
pub mod password;
pub mod service;
pub mod tokens;

use thiserror::Error;

use crate::store::StoreError;
use jwt::TokenError;

/// Authentication errors.
///
/// Several variants deliberately share a public message at the HTTP
/// boundary; keep the internal distinction for logging only.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Invalid or expired OTP")]
    InvalidOtp,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session is invalid or expired")]
    InvalidSession,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("User not found")]
    UserNotFound,

    #[error("Session belongs to another user")]
    NotSessionOwner,

    #[error("Missing token")]
    MissingToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Invalid => AuthError::InvalidToken,
            TokenError::Encode(msg) => AuthError::Internal(msg),
        }
    }
}
