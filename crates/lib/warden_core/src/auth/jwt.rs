//! JWT token generation and verification.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::auth::{AccessTokenClaims, RefreshTokenClaims, Role};

/// Token verification failures. Callers treat these differently: an expired
/// token prompts a refresh, an invalid one forces a new login.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("token encode failed: {0}")]
    Encode(String),
}

/// Signs and verifies access and refresh tokens (HS256).
///
/// Cheap to clone; keys are derived once from the configured secret.
#[derive(Clone)]
pub struct TokenCodec {
    config: Arc<AuthConfig>,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            config,
        }
    }

    /// Audience stamped into newly issued tokens.
    fn issued_audience(&self) -> String {
        self.config.audience.first().cloned().unwrap_or_default()
    }

    /// Generate a signed access token bound to `session_id`.
    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
        session_id: Uuid,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        let now = Utc::now();
        let expires_at = now + self.config.access_token_lifetime;
        let claims = AccessTokenClaims {
            sub: user_id,
            email: email.to_string(),
            role,
            sid: session_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.issued_audience(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(format!("jwt encode: {e}")))?;
        Ok((token, expires_at))
    }

    /// Generate a signed refresh token with a caller-supplied lifetime.
    ///
    /// The lifetime is explicit so login can honour "stay signed in" and
    /// rotation can preserve the session's remaining absolute expiry.
    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        lifetime: Duration,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        let now = Utc::now();
        let expires_at = now + lifetime;
        let claims = RefreshTokenClaims {
            sub: user_id,
            sid: session_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.issued_audience(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(format!("jwt encode: {e}")))?;
        Ok((token, expires_at))
    }

    /// Verify signature, issuer, audience and expiry of an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        self.verify(token)
    }

    /// Verify signature, issuer, audience and expiry of a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        self.verify(token)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&self.config.audience);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        decode::<T>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}
