//! In-process store used by tests and local runs without PostgreSQL.
//!
//! Conditional updates (rotation, reset completion) happen under the
//! dashmap shard lock for the affected entry, so they are atomic with
//! respect to concurrent callers.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{ResetTokenStore, SessionStore, StoreError, StoreResult, UserStore};
use crate::models::auth::{
    NewPasswordResetToken, NewUser, PasswordResetToken, Session, UserRecord,
};

#[derive(Default)]
pub struct MemoryAuthStore {
    users: DashMap<Uuid, UserRecord>,
    emails: DashMap<String, Uuid>,
    sessions: DashMap<Uuid, Session>,
    reset_tokens: DashMap<Uuid, PasswordResetToken>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored session. Lets tests age or expire a session.
    pub fn put_session(&self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    /// Number of reset tokens ever issued, used or not.
    pub fn reset_token_count(&self) -> usize {
        self.reset_tokens.len()
    }

    /// Overwrite a stored user.
    pub fn put_user(&self, user: UserRecord) {
        self.emails.insert(user.email.clone(), user.id);
        self.users.insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for MemoryAuthStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let Some(id) = self.emails.get(email).map(|r| *r) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let id = Uuid::new_v4();
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Conflict("users.email".into())),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        let now = Utc::now();
        let record = UserRecord {
            id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            is_blocked: false,
            blocked_at: None,
            blocked_by: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, record.clone());
        Ok(record)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn block_user(&self, user_id: Uuid, blocked_by: Uuid) -> StoreResult<bool> {
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(false);
        };
        let now = Utc::now();
        user.is_blocked = true;
        user.blocked_at = Some(now);
        user.blocked_by = Some(blocked_by);
        user.updated_at = now;
        Ok(true)
    }

    async fn unblock_user(&self, user_id: Uuid) -> StoreResult<bool> {
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.is_blocked = false;
        user.blocked_at = None;
        user.blocked_by = None;
        user.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for MemoryAuthStore {
    async fn create_session(&self, session: &Session) -> StoreResult<()> {
        if self
            .sessions
            .iter()
            .any(|s| s.refresh_token_hash == session.refresh_token_hash)
        {
            return Err(StoreError::Conflict("user_sessions.refresh_token_hash".into()));
        }
        match self.sessions.entry(session.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict("user_sessions.id".into())),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn find_session(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        Ok(self.sessions.get(&session_id).map(|s| s.clone()))
    }

    async fn find_session_by_refresh_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<Session>> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.refresh_token_hash == token_hash)
            .map(|s| s.clone()))
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> StoreResult<Vec<Session>> {
        let now = Utc::now();
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_usable_at(now))
            .map(|s| s.clone())
            .collect();
        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(sessions)
    }

    async fn list_active_session_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active)
            .map(|s| s.id)
            .collect())
    }

    async fn rotate_refresh_hash(
        &self,
        session_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> StoreResult<bool> {
        let Some(mut session) = self.sessions.get_mut(&session_id) else {
            return Ok(false);
        };
        if !session.is_active || session.refresh_token_hash != current_hash {
            return Ok(false);
        }
        session.refresh_token_hash = new_hash.to_string();
        session.last_activity_at = Utc::now();
        Ok(true)
    }

    async fn invalidate_session(&self, session_id: Uuid) -> StoreResult<()> {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.is_active = false;
        }
        Ok(())
    }

    async fn invalidate_user_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut changed = 0;
        for mut session in self.sessions.iter_mut() {
            if session.user_id == user_id && session.is_active {
                session.is_active = false;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryAuthStore {
    async fn create_reset_token(
        &self,
        token: NewPasswordResetToken,
    ) -> StoreResult<PasswordResetToken> {
        let record = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            otp: token.otp,
            expires_at: token.expires_at,
            used_at: None,
            created_at: Utc::now(),
        };
        self.reset_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_reset_token(
        &self,
        email: &str,
        otp: &str,
    ) -> StoreResult<Option<PasswordResetToken>> {
        let Some(user_id) = self.emails.get(email).map(|r| *r) else {
            return Ok(None);
        };
        let now = Utc::now();
        Ok(self
            .reset_tokens
            .iter()
            .filter(|t| {
                t.user_id == user_id && t.otp == otp && t.used_at.is_none() && t.expires_at > now
            })
            .max_by_key(|t| t.created_at)
            .map(|t| t.clone()))
    }

    async fn mark_reset_token_used(&self, token_id: Uuid) -> StoreResult<bool> {
        let Some(mut token) = self.reset_tokens.get_mut(&token_id) else {
            return Ok(false);
        };
        if token.used_at.is_some() {
            return Ok(false);
        }
        token.used_at = Some(Utc::now());
        Ok(true)
    }

    async fn complete_password_reset(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<Option<Vec<Uuid>>> {
        // The token entry stays locked until the user and sessions are updated.
        let Some(mut token) = self.reset_tokens.get_mut(&token_id) else {
            return Ok(None);
        };
        if token.used_at.is_some() || token.user_id != user_id {
            return Ok(None);
        }
        let now = Utc::now();
        token.used_at = Some(now);

        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = now;
        }
        let mut revoked = Vec::new();
        for mut session in self.sessions.iter_mut() {
            if session.user_id == user_id && session.is_active {
                session.is_active = false;
                revoked.push(session.id);
            }
        }
        Ok(Some(revoked))
    }
}
