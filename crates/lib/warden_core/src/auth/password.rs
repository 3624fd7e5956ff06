//! Password hashing via bcrypt, and one-time reset codes.

use rand::{Rng, rng};

use super::AuthError;

/// Default bcrypt cost factor (~250ms on commodity hardware).
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Minimum accepted length for a new password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password with bcrypt at the given cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
///
/// A malformed stored hash counts as a mismatch rather than an error so the
/// caller can keep login failures indistinguishable.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Generate a 6-digit one-time password, uniform over 100000..=999999.
pub fn generate_otp() -> String {
    let n: u32 = rng().random_range(100_000..=999_999);
    n.to_string()
}

/// Reject passwords that do not meet the minimum policy.
pub fn validate_new_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
