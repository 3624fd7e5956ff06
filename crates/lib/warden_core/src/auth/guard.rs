//! Request-time authentication: access token -> session state -> user state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AuthError;
use super::jwt::TokenCodec;
use super::service::SessionService;
use crate::cache::CacheLayer;
use crate::models::auth::{CachedSession, CachedUser, Identity};
use crate::store::AuthStore;

/// Resolves a bearer access token into an [`Identity`].
///
/// Session and user state are read cache-first; a miss or cache failure
/// falls through to the store and repopulates the cache.
#[derive(Clone)]
pub struct Authenticator {
    codec: TokenCodec,
    store: Arc<dyn AuthStore>,
    cache: CacheLayer,
}

impl Authenticator {
    pub fn new(codec: TokenCodec, store: Arc<dyn AuthStore>, cache: CacheLayer) -> Self {
        Self {
            codec,
            store,
            cache,
        }
    }

    /// Share the service's codec, store and cache.
    pub fn from_service(service: &SessionService) -> Self {
        Self::new(
            service.codec().clone(),
            service.store().clone(),
            service.cache().clone(),
        )
    }

    pub async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let claims = self.codec.validate_access_token(token)?;

        let Some(session) = self.session_state(claims.sid).await? else {
            debug!(session_id = %claims.sid, "access token for unknown session");
            return Err(AuthError::InvalidSession);
        };
        if session.user_id != claims.sub {
            warn!(
                session_id = %claims.sid,
                token_user = %claims.sub,
                session_user = %session.user_id,
                "session owner does not match token subject"
            );
            return Err(AuthError::InvalidSession);
        }
        if !session.is_active || Utc::now() >= session.expires_at {
            return Err(AuthError::InvalidSession);
        }

        let Some(user) = self.user_state(claims.sub).await? else {
            debug!(user_id = %claims.sub, "access token for missing user");
            return Err(AuthError::AccountDisabled);
        };
        if !user.is_active || user.is_blocked {
            return Err(AuthError::AccountDisabled);
        }

        Ok(Identity {
            user_id: claims.sub,
            email: user.email,
            role: user.role,
            session_id: claims.sid,
        })
    }

    async fn session_state(&self, session_id: Uuid) -> Result<Option<CachedSession>, AuthError> {
        if let Some(hit) = self.cache.session(session_id).await {
            return Ok(Some(hit));
        }
        let Some(session) = self.store.find_session(session_id).await? else {
            return Ok(None);
        };
        if !session.is_active || !self.cache.is_enabled() {
            return Ok(Some(CachedSession::from(&session)));
        }
        self.cache.put_session(&session).await;

        // An invalidation may have landed between the read and the cache
        // write; its eviction would then have run before our write.
        match self.store.find_session(session_id).await? {
            Some(current) if current.is_active => Ok(Some(CachedSession::from(&current))),
            current => {
                debug!(%session_id, "session revoked while caching, evicting");
                self.cache.evict_session(session_id).await;
                Ok(current.as_ref().map(CachedSession::from))
            }
        }
    }

    async fn user_state(&self, user_id: Uuid) -> Result<Option<CachedUser>, AuthError> {
        if let Some(hit) = self.cache.user(user_id).await {
            return Ok(Some(hit));
        }
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Ok(None);
        };
        self.cache.put_user(&user).await;
        Ok(Some(CachedUser::from(&user)))
    }
}
