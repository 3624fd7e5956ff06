//! Redis-backed cache.
//!
//! Values are JSON under `auth:session:<id>` and `auth:user:<id>`, written
//! with `SET EX` so Redis handles expiry.

use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use super::{AuthCache, CacheError};
use crate::models::auth::{CachedSession, CachedUser};

fn session_key(id: Uuid) -> String {
    format!("auth:session:{id}")
}

fn user_key(id: Uuid) -> String {
    format!("auth:user:{id}")
}

/// Cache over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisAuthCache {
    conn: ConnectionManager,
}

impl RedisAuthCache {
    /// Connect to `url` (e.g. `redis://:password@host:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                let _: () = conn.del(key).await?;
                Ok(None)
            }
        }
    }

    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, raw, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthCache for RedisAuthCache {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<CachedSession>, CacheError> {
        self.get_json(&session_key(session_id)).await
    }

    async fn set_session(
        &self,
        session_id: Uuid,
        session: &CachedSession,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.set_json(&session_key(session_id), session, ttl).await
    }

    async fn del_session(&self, session_id: Uuid) -> Result<(), CacheError> {
        self.del(&session_key(session_id)).await
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<CachedUser>, CacheError> {
        self.get_json(&user_key(user_id)).await
    }

    async fn set_user(
        &self,
        user_id: Uuid,
        user: &CachedUser,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.set_json(&user_key(user_id), user, ttl).await
    }

    async fn del_user(&self, user_id: Uuid) -> Result<(), CacheError> {
        self.del(&user_key(user_id)).await
    }
}
