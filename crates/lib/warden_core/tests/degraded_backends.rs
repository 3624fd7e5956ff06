//! Behaviour when the cache or the store misbehaves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use warden_core::auth::AuthError;
use warden_core::auth::guard::Authenticator;
use warden_core::auth::notifier::{NotifyError, ResetNotifier};
use warden_core::auth::service::{Registration, SessionService};
use warden_core::cache::memory::MemoryAuthCache;
use warden_core::cache::{AuthCache, CacheError, CacheLayer};
use warden_core::config::AuthConfig;
use warden_core::models::auth::{
    CachedSession, CachedUser, ClientMeta, NewPasswordResetToken, NewUser, PasswordResetToken,
    Session, UserRecord,
};
use warden_core::store::memory::MemoryAuthStore;
use warden_core::store::{
    AuthStore, ResetTokenStore, SessionStore, StoreError, StoreResult, UserStore,
};

const PASSWORD: &str = "password123";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Cache whose every call fails, as if the backend were unreachable.
struct UnreachableCache;

fn offline() -> CacheError {
    CacheError::Backend(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "cache offline",
    )))
}

#[async_trait]
impl AuthCache for UnreachableCache {
    async fn get_session(&self, _: Uuid) -> Result<Option<CachedSession>, CacheError> {
        Err(offline())
    }

    async fn set_session(
        &self,
        _: Uuid,
        _: &CachedSession,
        _: std::time::Duration,
    ) -> Result<(), CacheError> {
        Err(offline())
    }

    async fn del_session(&self, _: Uuid) -> Result<(), CacheError> {
        Err(offline())
    }

    async fn get_user(&self, _: Uuid) -> Result<Option<CachedUser>, CacheError> {
        Err(offline())
    }

    async fn set_user(
        &self,
        _: Uuid,
        _: &CachedUser,
        _: std::time::Duration,
    ) -> Result<(), CacheError> {
        Err(offline())
    }

    async fn del_user(&self, _: Uuid) -> Result<(), CacheError> {
        Err(offline())
    }
}

/// Memory store with switchable faults.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryAuthStore,
    fail_next_reset: AtomicBool,
    revoke_after_next_read: AtomicBool,
}

#[async_trait]
impl UserStore for FaultyStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        self.inner.find_user_by_id(user_id).await
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        self.inner.create_user(user).await
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        self.inner.update_password(user_id, password_hash).await
    }

    async fn block_user(&self, user_id: Uuid, blocked_by: Uuid) -> StoreResult<bool> {
        self.inner.block_user(user_id, blocked_by).await
    }

    async fn unblock_user(&self, user_id: Uuid) -> StoreResult<bool> {
        self.inner.unblock_user(user_id).await
    }
}

#[async_trait]
impl SessionStore for FaultyStore {
    async fn create_session(&self, session: &Session) -> StoreResult<()> {
        self.inner.create_session(session).await
    }

    /// With `revoke_after_next_read` set, returns the session as read and
    /// then invalidates it, like a logout racing the caller.
    async fn find_session(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        let found = self.inner.find_session(session_id).await?;
        if self.revoke_after_next_read.swap(false, Ordering::SeqCst) {
            self.inner.invalidate_session(session_id).await?;
        }
        Ok(found)
    }

    async fn find_session_by_refresh_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<Session>> {
        self.inner.find_session_by_refresh_hash(token_hash).await
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> StoreResult<Vec<Session>> {
        self.inner.list_active_sessions(user_id).await
    }

    async fn list_active_session_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.inner.list_active_session_ids(user_id).await
    }

    async fn rotate_refresh_hash(
        &self,
        session_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> StoreResult<bool> {
        self.inner
            .rotate_refresh_hash(session_id, current_hash, new_hash)
            .await
    }

    async fn invalidate_session(&self, session_id: Uuid) -> StoreResult<()> {
        self.inner.invalidate_session(session_id).await
    }

    async fn invalidate_user_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        self.inner.invalidate_user_sessions(user_id).await
    }
}

#[async_trait]
impl ResetTokenStore for FaultyStore {
    async fn create_reset_token(
        &self,
        token: NewPasswordResetToken,
    ) -> StoreResult<PasswordResetToken> {
        self.inner.create_reset_token(token).await
    }

    async fn find_reset_token(
        &self,
        email: &str,
        otp: &str,
    ) -> StoreResult<Option<PasswordResetToken>> {
        self.inner.find_reset_token(email, otp).await
    }

    async fn mark_reset_token_used(&self, token_id: Uuid) -> StoreResult<bool> {
        self.inner.mark_reset_token_used(token_id).await
    }

    async fn complete_password_reset(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<Option<Vec<Uuid>>> {
        if self.fail_next_reset.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Decode("connection reset".into()));
        }
        self.inner
            .complete_password_reset(token_id, user_id, password_hash)
            .await
    }
}

#[derive(Default)]
struct LastOtp(Mutex<Option<String>>);

#[async_trait]
impl ResetNotifier for LastOtp {
    async fn send_reset_otp(&self, _email: &str, otp: &str) -> Result<(), NotifyError> {
        *self.0.lock().unwrap() = Some(otp.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn service(store: Arc<dyn AuthStore>, cache: CacheLayer, notifier: Arc<LastOtp>) -> SessionService {
    let mut cfg = AuthConfig::with_secret("degraded-backend-secret");
    cfg.bcrypt_cost = 4;
    SessionService::new(Arc::new(cfg), store, cache, notifier)
}

async fn register(service: &SessionService, email: &str) -> Uuid {
    service
        .register(Registration {
            first_name: "Test".into(),
            last_name: "User".into(),
            email: email.into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap()
        .id
}

// ---------------------------------------------------------------------------
// Cache failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_cache_never_fails_a_request() {
    let cache = CacheLayer::new(Arc::new(UnreachableCache), Duration::hours(1));
    let svc = service(
        Arc::new(MemoryAuthStore::new()),
        cache,
        Arc::new(LastOtp::default()),
    );
    let auth = Authenticator::from_service(&svc);
    let user_id = register(&svc, "cacheless@example.com").await;
    let owner = svc
        .bootstrap_owner("root@example.com", PASSWORD)
        .await
        .unwrap()
        .unwrap();

    let first = svc
        .login("cacheless@example.com", PASSWORD, false, ClientMeta::default())
        .await
        .unwrap();
    let identity = auth.authenticate(&first.tokens.access_token).await.unwrap();
    assert_eq!(identity.user_id, user_id);

    let rotated = svc.refresh(&first.tokens.refresh_token).await.unwrap();
    auth.authenticate(&rotated.access_token).await.unwrap();

    svc.logout(first.session_id).await.unwrap();
    assert!(matches!(
        auth.authenticate(&rotated.access_token).await.unwrap_err(),
        AuthError::InvalidSession
    ));

    let second = svc
        .login("cacheless@example.com", PASSWORD, false, ClientMeta::default())
        .await
        .unwrap();
    auth.authenticate(&second.tokens.access_token).await.unwrap();

    svc.block_user(user_id, owner.id).await.unwrap();
    let err = auth
        .authenticate(&second.tokens.access_token)
        .await
        .unwrap_err();
    assert!(
        matches!(err, AuthError::InvalidSession | AuthError::AccountDisabled),
        "got {err:?}"
    );
    assert!(svc.refresh(&second.tokens.refresh_token).await.is_err());
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_reset_changes_nothing_and_can_be_retried() {
    let store = Arc::new(FaultyStore::default());
    let notifier = Arc::new(LastOtp::default());
    let cache = CacheLayer::new(Arc::new(MemoryAuthCache::new()), Duration::hours(1));
    let svc = service(store.clone(), cache, notifier.clone());
    let auth = Authenticator::from_service(&svc);
    register(&svc, "retry@example.com").await;

    let before = svc
        .login("retry@example.com", PASSWORD, false, ClientMeta::default())
        .await
        .unwrap();
    svc.request_password_reset("retry@example.com").await.unwrap();
    let otp = notifier.0.lock().unwrap().clone().unwrap();

    store.fail_next_reset.store(true, Ordering::SeqCst);
    let err = svc
        .verify_password_reset("retry@example.com", &otp, "brand-new-pass")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Store(_)), "got {err:?}");

    // Old password and session untouched.
    auth.authenticate(&before.tokens.access_token).await.unwrap();
    svc.login("retry@example.com", PASSWORD, false, ClientMeta::default())
        .await
        .unwrap();

    // The OTP is still good.
    svc.verify_password_reset("retry@example.com", &otp, "brand-new-pass")
        .await
        .unwrap();

    assert!(auth.authenticate(&before.tokens.access_token).await.is_err());
    assert!(svc.refresh(&before.tokens.refresh_token).await.is_err());
    assert!(store
        .list_active_sessions(before.user.id)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        svc.login("retry@example.com", PASSWORD, false, ClientMeta::default())
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    ));
    svc.login("retry@example.com", "brand-new-pass", false, ClientMeta::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn revocation_during_cache_fill_is_not_cached() {
    let store = Arc::new(FaultyStore::default());
    let cache_backend = Arc::new(MemoryAuthCache::new());
    let cache = CacheLayer::new(cache_backend.clone(), Duration::hours(1));
    let svc = service(store.clone(), cache, Arc::new(LastOtp::default()));
    let auth = Authenticator::from_service(&svc);
    register(&svc, "race@example.com").await;

    let out = svc
        .login("race@example.com", PASSWORD, false, ClientMeta::default())
        .await
        .unwrap();
    // Force the next authentication through the store.
    cache_backend.del_session(out.session_id).await.unwrap();

    store.revoke_after_next_read.store(true, Ordering::SeqCst);
    let err = auth
        .authenticate(&out.tokens.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSession), "got {err:?}");

    assert!(cache_backend
        .get_session(out.session_id)
        .await
        .unwrap()
        .is_none());
    assert!(auth.authenticate(&out.tokens.access_token).await.is_err());
}
