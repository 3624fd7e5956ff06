//! Administrative account handlers. Mounted behind the role gate.

use axum::Json;
use axum::extract::{Extension, Path, State};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{LogoutAllResponse, MessageResponse};

/// `POST /auth/block-user/{id}` — block an account and revoke its sessions.
pub async fn block_user_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(admin)): Extension<AuthenticatedUser>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    state.sessions.block_user(user_id, admin.user_id).await?;
    Ok(Json(MessageResponse::new("User blocked")))
}

/// `POST /auth/unblock-user/{id}`
pub async fn unblock_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    state.sessions.unblock_user(user_id).await?;
    Ok(Json(MessageResponse::new("User unblocked")))
}

/// `POST /auth/logout-all-user-sessions/{id}` — revoke every session of a user.
pub async fn logout_user_sessions_handler(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<LogoutAllResponse>> {
    let revoked = state.sessions.logout_all(user_id).await?;
    Ok(Json(LogoutAllResponse {
        message: "User sessions revoked".into(),
        sessions_revoked: revoked,
    }))
}
