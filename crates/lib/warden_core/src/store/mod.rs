//! Persistence contracts for users, sessions and password-reset tokens.
//!
//! The relational store is the single source of truth. Every operation either
//! completes or returns a [`StoreError`]; nothing here swallows a failure.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{
    NewPasswordResetToken, NewUser, PasswordResetToken, Session, UserRecord,
};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Stored data could not be decoded: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// User auth records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>>;

    /// Insert a user. A taken email yields [`StoreError::Conflict`].
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()>;

    /// Mark blocked with timestamp and actor. Returns false if no such user.
    async fn block_user(&self, user_id: Uuid, blocked_by: Uuid) -> StoreResult<bool>;

    /// Clear the blocked flags. Returns false if no such user.
    async fn unblock_user(&self, user_id: Uuid) -> StoreResult<bool>;
}

/// Session records. Sessions are soft-invalidated, never deleted.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session. A duplicate refresh hash yields [`StoreError::Conflict`].
    async fn create_session(&self, session: &Session) -> StoreResult<()>;

    async fn find_session(&self, session_id: Uuid) -> StoreResult<Option<Session>>;

    async fn find_session_by_refresh_hash(&self, token_hash: &str)
    -> StoreResult<Option<Session>>;

    /// Active, unexpired sessions ordered by most recent activity first.
    async fn list_active_sessions(&self, user_id: Uuid) -> StoreResult<Vec<Session>>;

    /// Ids of active sessions, for cache invalidation fan-out.
    async fn list_active_session_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>>;

    /// Replace the refresh hash of an active session still holding
    /// `current_hash`, advancing `last_activity_at`. Returns false when
    /// another rotation already won or the session was invalidated.
    async fn rotate_refresh_hash(
        &self,
        session_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> StoreResult<bool>;

    /// Mark one session inactive. Idempotent.
    async fn invalidate_session(&self, session_id: Uuid) -> StoreResult<()>;

    /// Mark every session of a user inactive. Returns the number changed.
    async fn invalidate_user_sessions(&self, user_id: Uuid) -> StoreResult<u64>;
}

/// Password-reset token records.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn create_reset_token(
        &self,
        token: NewPasswordResetToken,
    ) -> StoreResult<PasswordResetToken>;

    /// Newest unused, unexpired token for this email and OTP.
    async fn find_reset_token(
        &self,
        email: &str,
        otp: &str,
    ) -> StoreResult<Option<PasswordResetToken>>;

    /// Set `used_at` if still unset. Returns false if already used.
    async fn mark_reset_token_used(&self, token_id: Uuid) -> StoreResult<bool>;

    /// Claim the token, store the new password hash and invalidate every
    /// session of the user, all or nothing.
    ///
    /// Returns the ids of the sessions invalidated, or `None` when the token
    /// was already used (nothing is changed in that case).
    async fn complete_password_reset(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<Option<Vec<Uuid>>>;
}

/// Everything the session service needs from persistence.
pub trait AuthStore: UserStore + SessionStore + ResetTokenStore {}

impl<T> AuthStore for T where T: UserStore + SessionStore + ResetTokenStore {}
