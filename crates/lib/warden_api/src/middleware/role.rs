//! Role gate. Runs after [`require_auth`](super::auth::require_auth).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use warden_core::models::auth::Role;

use super::auth::AuthenticatedUser;
use crate::error::AppError;

/// Axum middleware: rejects callers whose role is not in `allowed`.
///
/// Mount with `from_fn_with_state(Role::ADMINISTRATIVE, require_role)`.
pub async fn require_role(
    State(allowed): State<&'static [Role]>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(AuthenticatedUser(identity)) = request.extensions().get::<AuthenticatedUser>() else {
        return Err(AppError::Unauthorized("Authentication required".into()));
    };
    if !allowed.contains(&identity.role) {
        warn!(
            user_id = %identity.user_id,
            role = %identity.role,
            path = %request.uri().path(),
            "insufficient role"
        );
        return Err(AppError::Forbidden("Insufficient permissions".into()));
    }
    Ok(next.run(request).await)
}
