//! Delivery of password-reset codes.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Hands a reset OTP to the user through some out-of-band channel.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset_otp(&self, email: &str, otp: &str) -> Result<(), NotifyError>;
}

/// Writes the OTP to the log. For development only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset_otp(&self, email: &str, otp: &str) -> Result<(), NotifyError> {
        info!(%email, %otp, "password reset OTP issued");
        Ok(())
    }
}
