//! Application error types.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use warden_core::auth::AuthError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Unauthorized(m) => {
                (StatusCode::UNAUTHORIZED, "authentication_error", m.as_str())
            }
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "token_expired",
                "Token has expired",
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "authorization_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::EmailAlreadyExists => AppError::Conflict("Email already exists".into()),
            AuthError::InvalidOtp => AppError::Validation("Invalid or expired OTP".into()),
            AuthError::SessionNotFound => AppError::NotFound("Session not found".into()),
            AuthError::InvalidSession => {
                AppError::Unauthorized("Session is invalid or expired".into())
            }
            AuthError::AccountDisabled => AppError::Forbidden("Account is disabled".into()),
            AuthError::UserNotFound => AppError::NotFound("User not found".into()),
            AuthError::NotSessionOwner => {
                AppError::Forbidden("You can only manage your own sessions".into())
            }
            AuthError::MissingToken => {
                AppError::Unauthorized("Missing authentication token".into())
            }
            AuthError::ExpiredToken => AppError::TokenExpired,
            AuthError::InvalidToken => AppError::Unauthorized("Invalid token".into()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Store(e) => {
                error!(error = %e, "store failure");
                AppError::Internal(e.to_string())
            }
            AuthError::Internal(msg) => {
                error!(error = %msg, "internal auth failure");
                AppError::Internal(msg)
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
