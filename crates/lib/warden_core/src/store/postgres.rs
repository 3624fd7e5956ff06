//! PostgreSQL implementation of the store contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{ResetTokenStore, SessionStore, StoreError, StoreResult, UserStore};
use crate::auth::device::DeviceInfo;
use crate::models::auth::{
    NewPasswordResetToken, NewUser, PasswordResetToken, Session, UserRecord,
};

const USER_COLUMNS: &str = "u.id, u.first_name, u.last_name, u.email, u.password_hash, \
     ro.name AS role, u.is_active, u.is_blocked, u.blocked_at, u.blocked_by, \
     u.created_at, u.updated_at";

const SESSION_COLUMNS: &str = "id, user_id, refresh_token_hash, device_info, ip_address, \
     user_agent, is_active, last_activity_at, expires_at, created_at";

/// Auth store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema in `warden_core/migrations/`, embedded at build time.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    is_blocked: bool,
    blocked_at: Option<DateTime<Utc>>,
    blocked_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let role = r
            .role
            .parse()
            .map_err(|e| StoreError::Decode(format!("user {}: {e}", r.id)))?;
        Ok(UserRecord {
            id: r.id,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            password_hash: r.password_hash,
            role,
            is_active: r.is_active,
            is_blocked: r.is_blocked,
            blocked_at: r.blocked_at,
            blocked_by: r.blocked_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    refresh_token_hash: String,
    device_info: Json<DeviceInfo>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    is_active: bool,
    last_activity_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(r: SessionRow) -> Self {
        Session {
            id: r.id,
            user_id: r.user_id,
            refresh_token_hash: r.refresh_token_hash,
            device: r.device_info.0,
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            is_active: r.is_active,
            last_activity_at: r.last_activity_at,
            expires_at: r.expires_at,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ResetTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    otp: String,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ResetTokenRow> for PasswordResetToken {
    fn from(r: ResetTokenRow) -> Self {
        PasswordResetToken {
            id: r.id,
            user_id: r.user_id,
            token_hash: r.token_hash,
            otp: r.otp,
            expires_at: r.expires_at,
            used_at: r.used_at,
            created_at: r.created_at,
        }
    }
}

/// Map unique-constraint violations to [`StoreError::Conflict`].
fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::Db(e),
    }
}

#[async_trait]
impl UserStore for PgAuthStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles ro ON ro.id = u.role_id \
             WHERE u.email = $1 AND u.deleted_at IS NULL"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(UserRecord::try_from)
            .transpose()
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles ro ON ro.id = u.role_id \
             WHERE u.id = $1 AND u.deleted_at IS NULL"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(UserRecord::try_from)
            .transpose()
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let row = sqlx::query_as::<_, (Uuid, bool, bool, DateTime<Utc>, DateTime<Utc>)>(
            "INSERT INTO users (first_name, last_name, email, password_hash, role_id) \
             VALUES ($1, $2, $3, $4, (SELECT id FROM roles WHERE name = $5)) \
             RETURNING id, is_active, is_blocked, created_at, updated_at",
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "users.email"))?;

        Ok(UserRecord {
            id: row.0,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: row.1,
            is_blocked: row.2,
            blocked_at: None,
            blocked_by: None,
            created_at: row.3,
            updated_at: row.4,
        })
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = now() \
             WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn block_user(&self, user_id: Uuid, blocked_by: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_blocked = true, blocked_at = now(), blocked_by = $1, \
             updated_at = now() WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(blocked_by)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unblock_user(&self, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_blocked = false, blocked_at = NULL, blocked_by = NULL, \
             updated_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionStore for PgAuthStore {
    async fn create_session(&self, session: &Session) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO user_sessions (id, user_id, refresh_token_hash, device_info, \
             ip_address, user_agent, is_active, last_activity_at, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(Json(&session.device))
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.is_active)
        .bind(session.last_activity_at)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "user_sessions.refresh_token_hash"))?;
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE id = $1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Session::from))
    }

    async fn find_session_by_refresh_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<Session>> {
        let sql =
            format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE refresh_token_hash = $1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Session::from))
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> StoreResult<Vec<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions \
             WHERE user_id = $1 AND is_active = true AND expires_at > now() \
             ORDER BY last_activity_at DESC"
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn list_active_session_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM user_sessions WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn rotate_refresh_hash(
        &self,
        session_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE user_sessions SET refresh_token_hash = $1, last_activity_at = now() \
             WHERE id = $2 AND refresh_token_hash = $3 AND is_active = true",
        )
        .bind(new_hash)
        .bind(session_id)
        .bind(current_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "user_sessions.refresh_token_hash"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn invalidate_session(&self, session_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE user_sessions SET is_active = false WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn invalidate_user_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = false \
             WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ResetTokenStore for PgAuthStore {
    async fn create_reset_token(
        &self,
        token: NewPasswordResetToken,
    ) -> StoreResult<PasswordResetToken> {
        let row = sqlx::query_as::<_, ResetTokenRow>(
            "INSERT INTO password_reset_tokens (user_id, token_hash, otp, expires_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, token_hash, otp, expires_at, used_at, created_at",
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.otp)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_reset_token(
        &self,
        email: &str,
        otp: &str,
    ) -> StoreResult<Option<PasswordResetToken>> {
        let row = sqlx::query_as::<_, ResetTokenRow>(
            "SELECT prt.id, prt.user_id, prt.token_hash, prt.otp, prt.expires_at, \
                    prt.used_at, prt.created_at \
             FROM password_reset_tokens prt \
             JOIN users u ON u.id = prt.user_id \
             WHERE u.email = $1 AND prt.otp = $2 \
               AND prt.used_at IS NULL AND prt.expires_at > now() \
             ORDER BY prt.created_at DESC \
             LIMIT 1",
        )
        .bind(email)
        .bind(otp)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PasswordResetToken::from))
    }

    async fn mark_reset_token_used(&self, token_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET used_at = now() \
             WHERE id = $1 AND used_at IS NULL",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_password_reset(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<Option<Vec<Uuid>>> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE password_reset_tokens SET used_at = now() \
             WHERE id = $1 AND user_id = $2 AND used_at IS NULL",
        )
        .bind(token_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = now() \
             WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let revoked = sqlx::query_scalar::<_, Uuid>(
            "UPDATE user_sessions SET is_active = false \
             WHERE user_id = $1 AND is_active = true \
             RETURNING id",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(revoked))
    }
}
