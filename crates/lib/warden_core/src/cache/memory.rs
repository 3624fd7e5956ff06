//! In-process cache with lazy TTL expiry.
//!
//! Expired entries are dropped when read; there is no sweep task.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{AuthCache, CacheError};
use crate::models::auth::{CachedSession, CachedUser};

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

fn read<T: Clone>(map: &DashMap<Uuid, CacheEntry<T>>, id: Uuid) -> Option<T> {
    let now = Instant::now();
    let hit = map.get(&id).map(|e| (e.value.clone(), e.expires_at))?;
    if now < hit.1 {
        return Some(hit.0);
    }
    map.remove_if(&id, |_, e| e.expires_at <= now);
    None
}

fn write<T>(map: &DashMap<Uuid, CacheEntry<T>>, id: Uuid, value: T, ttl: Duration) {
    map.insert(
        id,
        CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        },
    );
}

#[derive(Debug, Default)]
pub struct MemoryAuthCache {
    sessions: DashMap<Uuid, CacheEntry<CachedSession>>,
    users: DashMap<Uuid, CacheEntry<CachedUser>>,
}

impl MemoryAuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.sessions.len() + self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuthCache for MemoryAuthCache {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<CachedSession>, CacheError> {
        Ok(read(&self.sessions, session_id))
    }

    async fn set_session(
        &self,
        session_id: Uuid,
        session: &CachedSession,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        write(&self.sessions, session_id, session.clone(), ttl);
        Ok(())
    }

    async fn del_session(&self, session_id: Uuid) -> Result<(), CacheError> {
        self.sessions.remove(&session_id);
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<CachedUser>, CacheError> {
        Ok(read(&self.users, user_id))
    }

    async fn set_user(
        &self,
        user_id: Uuid,
        user: &CachedUser,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        write(&self.users, user_id, user.clone(), ttl);
        Ok(())
    }

    async fn del_user(&self, user_id: Uuid) -> Result<(), CacheError> {
        self.users.remove(&user_id);
        Ok(())
    }
}
