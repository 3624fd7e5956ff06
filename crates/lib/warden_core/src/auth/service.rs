//! Session service: the only writer of session and user auth state.
//!
//! Session lifecycle: `Active` -> `Rotated` (same row, new refresh hash) ->
//! `Invalidated`. Invalidated is terminal.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AuthError;
use super::device::DeviceInfo;
use super::jwt::TokenCodec;
use super::notifier::ResetNotifier;
use super::password::{generate_otp, hash_password, validate_new_password, verify_password};
use super::tokens::{generate_secure_token, hash_token};
use crate::cache::CacheLayer;
use crate::config::AuthConfig;
use crate::models::auth::{
    ClientMeta, LoginOutcome, NewPasswordResetToken, NewUser, Role, Session, SessionSummary,
    TokenPair, UserProfile, UserRecord,
};
use crate::store::{AuthStore, StoreError};

/// Registration input.
#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Orchestrates login, rotation, revocation and password reset.
#[derive(Clone)]
pub struct SessionService {
    config: Arc<AuthConfig>,
    codec: TokenCodec,
    store: Arc<dyn AuthStore>,
    cache: CacheLayer,
    notifier: Arc<dyn ResetNotifier>,
    // Hash checked against when the email is unknown, at the configured cost.
    dummy_hash: Arc<OnceCell<String>>,
}

impl SessionService {
    pub fn new(
        config: Arc<AuthConfig>,
        store: Arc<dyn AuthStore>,
        cache: CacheLayer,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(config.clone()),
            config,
            store,
            cache,
            notifier,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    // -----------------------------------------------------------------------
    // Credentials
    // -----------------------------------------------------------------------

    /// Authenticate with email + password and open a new session.
    ///
    /// Unknown email, disabled account and wrong password are one error.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        stay_signed_in: bool,
        meta: ClientMeta,
    ) -> Result<LoginOutcome, AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            // Unknown emails cost one bcrypt check, like known ones.
            let dummy = self.dummy_hash().await?;
            self.check_password(password, dummy).await?;
            debug!(%email, "login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        let password_ok = self.check_password(password, &user.password_hash).await?;
        if !user.can_authenticate() {
            info!(user_id = %user.id, "login rejected: account disabled");
            return Err(AuthError::InvalidCredentials);
        }
        if !password_ok {
            info!(user_id = %user.id, "login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let lifetime = if stay_signed_in {
            self.config.stay_signed_in_lifetime
        } else {
            self.config.refresh_token_lifetime
        };

        // Allocated before insert since both tokens embed it; v7 sorts by creation.
        let session_id = Uuid::now_v7();
        let (refresh_token, refresh_expires_at) =
            self.codec
                .generate_refresh_token(user.id, session_id, lifetime)?;
        let (access_token, access_expires_at) =
            self.codec
                .generate_access_token(user.id, &user.email, user.role, session_id)?;

        let now = Utc::now();
        let session = Session {
            id: session_id,
            user_id: user.id,
            refresh_token_hash: hash_token(&refresh_token),
            device: meta
                .user_agent
                .as_deref()
                .map(DeviceInfo::parse)
                .unwrap_or_else(DeviceInfo::unknown),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            is_active: true,
            last_activity_at: now,
            expires_at: refresh_expires_at,
            created_at: now,
        };
        self.store.create_session(&session).await?;

        self.cache.put_session(&session).await;
        self.cache.put_user(&user).await;

        info!(user_id = %user.id, %session_id, stay_signed_in, "user logged in");
        Ok(LoginOutcome {
            user: UserProfile::from(&user),
            session_id,
            tokens: TokenPair {
                access_token,
                access_expires_at,
                refresh_token,
                refresh_expires_at,
            },
        })
    }

    /// Create a customer account.
    pub async fn register(&self, input: Registration) -> Result<UserProfile, AuthError> {
        let Registration {
            first_name,
            last_name,
            email,
            password,
        } = input;
        validate_registration(&first_name, &last_name, &email)?;
        validate_new_password(&password)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = self.hash(&password).await?;
        let user = self
            .create_user(NewUser {
                first_name,
                last_name,
                email,
                password_hash,
                role: Role::Customer,
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(UserProfile::from(&user))
    }

    /// Create an owner account unless the email is already taken.
    ///
    /// Returns `None` when the account already exists.
    pub async fn bootstrap_owner(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserProfile>, AuthError> {
        if self.store.find_user_by_email(email).await?.is_some() {
            return Ok(None);
        }
        validate_new_password(password)?;
        let password_hash = self.hash(password).await?;
        let user = self
            .create_user(NewUser {
                first_name: "Owner".into(),
                last_name: "Account".into(),
                email: email.to_string(),
                password_hash,
                role: Role::Owner,
            })
            .await?;
        info!(user_id = %user.id, %email, "bootstrap owner created");
        Ok(Some(UserProfile::from(&user)))
    }

    /// Current profile of an authenticated user.
    pub async fn get_me(&self, user_id: Uuid) -> Result<UserProfile, AuthError> {
        let user = self.require_user(user_id).await?;
        Ok(UserProfile::from(&user))
    }

    /// Change the password of an authenticated user. Sessions are kept.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_new_password(new_password)?;
        let user = self.require_user(user_id).await?;
        if !self.check_password(current_password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        let password_hash = self.hash(new_password).await?;
        self.store.update_password(user_id, &password_hash).await?;
        info!(%user_id, "password changed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Token rotation
    // -----------------------------------------------------------------------

    /// Exchange a refresh token for a new pair. The presented token stops
    /// working once this returns.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.codec.validate_refresh_token(refresh_token)?;
        let current_hash = hash_token(refresh_token);

        let Some(session) = self
            .store
            .find_session_by_refresh_hash(&current_hash)
            .await?
        else {
            warn!(session_id = %claims.sid, "refresh token not current for any session");
            return Err(AuthError::SessionNotFound);
        };
        if session.id != claims.sid || session.user_id != claims.sub {
            warn!(session_id = %session.id, "refresh token claims do not match session");
            return Err(AuthError::InvalidSession);
        }

        let now = Utc::now();
        if !session.is_usable_at(now) {
            if session.is_active {
                self.end_session(session.id).await?;
            }
            return Err(AuthError::InvalidSession);
        }

        let user = self.store.find_user_by_id(claims.sub).await?;
        let user = match user {
            Some(u) if u.can_authenticate() => u,
            _ => {
                info!(session_id = %session.id, user_id = %claims.sub, "refresh for disabled account");
                self.end_session(session.id).await?;
                self.cache.evict_user(claims.sub).await;
                return Err(AuthError::InvalidSession);
            }
        };

        // Keep the session's absolute expiry; rotation never extends it.
        let remaining = session.expires_at - now;
        let (new_refresh, refresh_expires_at) =
            self.codec
                .generate_refresh_token(user.id, session.id, remaining)?;
        let (access_token, access_expires_at) =
            self.codec
                .generate_access_token(user.id, &user.email, user.role, session.id)?;

        let rotated = self
            .store
            .rotate_refresh_hash(session.id, &current_hash, &hash_token(&new_refresh))
            .await?;
        if !rotated {
            warn!(session_id = %session.id, "refresh lost a concurrent rotation");
            return Err(AuthError::InvalidSession);
        }

        self.cache.put_user(&user).await;
        debug!(session_id = %session.id, "refresh token rotated");
        Ok(TokenPair {
            access_token,
            access_expires_at,
            refresh_token: new_refresh,
            refresh_expires_at,
        })
    }

    // -----------------------------------------------------------------------
    // Revocation
    // -----------------------------------------------------------------------

    /// Invalidate one session. Idempotent.
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AuthError> {
        self.end_session(session_id).await?;
        info!(%session_id, "session logged out");
        Ok(())
    }

    /// Invalidate every session of a user. Returns how many were active.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let count = self.revoke_all_sessions(user_id).await?;
        info!(%user_id, count, "all sessions logged out");
        Ok(count)
    }

    /// Block an account and revoke all of its sessions immediately.
    pub async fn block_user(&self, target_id: Uuid, actor_id: Uuid) -> Result<(), AuthError> {
        if !self.store.block_user(target_id, actor_id).await? {
            return Err(AuthError::UserNotFound);
        }
        let count = self.revoke_all_sessions(target_id).await?;
        info!(user_id = %target_id, blocked_by = %actor_id, sessions = count, "user blocked");
        Ok(())
    }

    /// Clear the blocked flag. Revoked sessions stay revoked.
    pub async fn unblock_user(&self, target_id: Uuid) -> Result<(), AuthError> {
        if !self.store.unblock_user(target_id).await? {
            return Err(AuthError::UserNotFound);
        }
        self.cache.evict_user(target_id).await;
        info!(user_id = %target_id, "user unblocked");
        Ok(())
    }

    /// Active sessions of a user, most recent first, flagging the caller's.
    pub async fn get_user_sessions(
        &self,
        user_id: Uuid,
        current_session_id: Uuid,
    ) -> Result<Vec<SessionSummary>, AuthError> {
        let sessions = self.store.list_active_sessions(user_id).await?;
        Ok(sessions
            .into_iter()
            .map(|s| SessionSummary {
                id: s.id,
                device_name: s.device.label(),
                device_info: s.device,
                ip_address: s.ip_address,
                last_activity_at: s.last_activity_at,
                expires_at: s.expires_at,
                created_at: s.created_at,
                is_current: s.id == current_session_id,
            })
            .collect())
    }

    /// Invalidate one of the requesting user's own sessions.
    pub async fn delete_session(
        &self,
        session_id: Uuid,
        requesting_user_id: Uuid,
    ) -> Result<(), AuthError> {
        let Some(session) = self.store.find_session(session_id).await? else {
            return Err(AuthError::SessionNotFound);
        };
        if session.user_id != requesting_user_id {
            warn!(%session_id, user_id = %requesting_user_id, "attempt to delete foreign session");
            return Err(AuthError::NotSessionOwner);
        }
        self.end_session(session_id).await?;
        info!(%session_id, user_id = %requesting_user_id, "session deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Password reset
    // -----------------------------------------------------------------------

    /// Issue a reset OTP. Succeeds identically whether or not the email exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            debug!(%email, "password reset requested for unknown email");
            return Ok(());
        };

        let otp = generate_otp();
        let token = generate_secure_token();
        self.store
            .create_reset_token(NewPasswordResetToken {
                user_id: user.id,
                token_hash: hash_token(&token),
                otp: otp.clone(),
                expires_at: Utc::now() + self.config.password_reset_otp_lifetime,
            })
            .await?;

        if let Err(e) = self.notifier.send_reset_otp(&user.email, &otp).await {
            warn!(user_id = %user.id, error = %e, "reset OTP delivery failed");
        }
        info!(user_id = %user.id, "password reset requested");
        Ok(())
    }

    /// Consume a reset OTP, set the new password and revoke every session.
    ///
    /// The three writes commit together, so a failed attempt leaves the OTP
    /// usable and the old password and sessions untouched.
    pub async fn verify_password_reset(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_new_password(new_password)?;
        let Some(token) = self.store.find_reset_token(email, otp).await? else {
            return Err(AuthError::InvalidOtp);
        };

        let password_hash = self.hash(new_password).await?;
        let Some(revoked) = self
            .store
            .complete_password_reset(token.id, token.user_id, &password_hash)
            .await?
        else {
            return Err(AuthError::InvalidOtp);
        };

        // Committed; cache cleanup is best-effort from here.
        self.cache.evict_sessions(&revoked).await;
        self.cache.evict_user(token.user_id).await;

        info!(user_id = %token.user_id, sessions = revoked.len(), "password reset completed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn require_user(&self, user_id: Uuid) -> Result<UserRecord, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AuthError> {
        self.store.create_user(user).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::EmailAlreadyExists,
            other => AuthError::Store(other),
        })
    }

    async fn end_session(&self, session_id: Uuid) -> Result<(), AuthError> {
        self.store.invalidate_session(session_id).await?;
        self.cache.evict_session(session_id).await;
        Ok(())
    }

    /// Invalidate all sessions of `user_id` and evict their cache entries.
    ///
    /// Session ids are read first for cache fan-out; failing to read them
    /// only leaves cache entries to expire on their own.
    async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let ids = match self.store.list_active_session_ids(user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(%user_id, error = %e, "could not list sessions for cache eviction");
                Vec::new()
            }
        };
        let count = self.store.invalidate_user_sessions(user_id).await?;
        self.cache.evict_sessions(&ids).await;
        self.cache.evict_user(user_id).await;
        Ok(count)
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let cost = self.config.bcrypt_cost;
        tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| AuthError::Internal(format!("hash task: {e}")))?
    }

    async fn dummy_hash(&self) -> Result<&str, AuthError> {
        self.dummy_hash
            .get_or_try_init(|| self.hash("warden-unknown-account"))
            .await
            .map(String::as_str)
    }

    async fn check_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let (password, hash) = (password.to_string(), hash.to_string());
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("verify task: {e}")))
    }
}

fn validate_registration(first_name: &str, last_name: &str, email: &str) -> Result<(), AuthError> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(AuthError::Validation("First and last name are required".into()));
    }
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(AuthError::Validation("A valid email address is required".into()));
    }
    Ok(())
}
