//! Optional read-through cache for session and user auth state.
//!
//! The cache is never authoritative. [`CacheLayer`] wraps an optional
//! backend and turns every failure into a logged miss, so callers can treat
//! it as infallible and fall back to the store.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::auth::{CachedSession, CachedUser, Session, UserRecord};

/// Cache backend errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("Cache encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Key/value contract for cached auth projections.
#[async_trait]
pub trait AuthCache: Send + Sync {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<CachedSession>, CacheError>;

    async fn set_session(
        &self,
        session_id: Uuid,
        session: &CachedSession,
        ttl: std::time::Duration,
    ) -> Result<(), CacheError>;

    async fn del_session(&self, session_id: Uuid) -> Result<(), CacheError>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<CachedUser>, CacheError>;

    async fn set_user(
        &self,
        user_id: Uuid,
        user: &CachedUser,
        ttl: std::time::Duration,
    ) -> Result<(), CacheError>;

    async fn del_user(&self, user_id: Uuid) -> Result<(), CacheError>;
}

/// Bound `ttl` by the time left until `expires_at`.
///
/// Returns `None` when the entry is already expired and must not be cached.
pub fn clamp_ttl(
    ttl: Duration,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<std::time::Duration> {
    let remaining = expires_at - now;
    if remaining <= Duration::zero() || ttl <= Duration::zero() {
        return None;
    }
    ttl.min(remaining).to_std().ok()
}

/// Best-effort front for an optional [`AuthCache`].
#[derive(Clone)]
pub struct CacheLayer {
    backend: Option<Arc<dyn AuthCache>>,
    ttl: Duration,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn AuthCache>, ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            ttl,
        }
    }

    /// A layer that never caches.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: Duration::zero(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn session(&self, session_id: Uuid) -> Option<CachedSession> {
        let backend = self.backend.as_ref()?;
        match backend.get_session(session_id).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(%session_id, error = %e, "cache get_session failed");
                None
            }
        }
    }

    pub async fn put_session(&self, session: &Session) {
        let Some(backend) = &self.backend else {
            return;
        };
        let Some(ttl) = clamp_ttl(self.ttl, session.expires_at, Utc::now()) else {
            return;
        };
        if let Err(e) = backend
            .set_session(session.id, &CachedSession::from(session), ttl)
            .await
        {
            warn!(session_id = %session.id, error = %e, "cache set_session failed");
        }
    }

    pub async fn evict_session(&self, session_id: Uuid) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.del_session(session_id).await {
            warn!(%session_id, error = %e, "cache del_session failed");
        }
    }

    pub async fn evict_sessions(&self, session_ids: &[Uuid]) {
        for id in session_ids {
            self.evict_session(*id).await;
        }
    }

    pub async fn user(&self, user_id: Uuid) -> Option<CachedUser> {
        let backend = self.backend.as_ref()?;
        match backend.get_user(user_id).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(%user_id, error = %e, "cache get_user failed");
                None
            }
        }
    }

    pub async fn put_user(&self, user: &UserRecord) {
        let Some(backend) = &self.backend else {
            return;
        };
        let Ok(ttl) = self.ttl.to_std() else {
            return;
        };
        if ttl.is_zero() {
            return;
        }
        if let Err(e) = backend.set_user(user.id, &CachedUser::from(user), ttl).await {
            warn!(user_id = %user.id, error = %e, "cache set_user failed");
        }
    }

    pub async fn evict_user(&self, user_id: Uuid) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.del_user(user_id).await {
            warn!(%user_id, error = %e, "cache del_user failed");
        }
    }
}
