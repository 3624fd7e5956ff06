//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;
use warden_core::auth::AuthError;
use warden_core::auth::service::Registration;
use warden_core::models::auth::SessionSummary;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, RequestMeta};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutAllResponse, MessageResponse,
    RefreshRequest, RegisterRequest, ResetPasswordRequest, TokenResponse, UserResponse,
    VerifyResetRequest,
};
use crate::services::cookies;

/// Drop both auth cookies from the jar.
fn clear_auth_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(cookies::clear_access_cookie(secure))
        .add(cookies::clear_refresh_cookie(secure))
}

/// `POST /auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    RequestMeta(meta): RequestMeta,
    jar: CookieJar,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::Validation("Email and password are required".into()));
    }
    let outcome = state
        .sessions
        .login(body.email.trim(), &body.password, body.stay_signed_in, meta)
        .await?;

    let secure = state.config.production;
    let tokens = &outcome.tokens;
    let jar = jar
        .add(cookies::access_cookie(
            &tokens.access_token,
            tokens.access_expires_at,
            secure,
        ))
        .add(cookies::refresh_cookie(
            &tokens.refresh_token,
            tokens.refresh_expires_at,
            secure,
        ));

    Ok((
        jar,
        Json(LoginResponse {
            tokens: TokenResponse::from(tokens),
            user: outcome.user,
        }),
    ))
}

/// `POST /auth/register` — create a customer account.
pub async fn register_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state
        .sessions
        .register(Registration {
            first_name: body.first_name.trim().to_string(),
            last_name: body.last_name.trim().to_string(),
            email: body.email.trim().to_string(),
            password: body.password,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

/// `POST /auth/refresh` — exchange a refresh token (cookie or body) for a new pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let from_cookie = jar
        .get(cookies::REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    let token = match from_cookie {
        Some(t) => t,
        None => refresh_token_from_body(&body)?.ok_or(AuthError::MissingToken)?,
    };

    let tokens = state
        .sessions
        .refresh(&token)
        .await
        .map_err(|e| match e {
            // A rotated-away token is a credential failure, not a missing resource.
            AuthError::SessionNotFound => AuthError::InvalidSession,
            other => other,
        })?;

    let secure = state.config.production;
    let jar = jar
        .add(cookies::access_cookie(
            &tokens.access_token,
            tokens.access_expires_at,
            secure,
        ))
        .add(cookies::refresh_cookie(
            &tokens.refresh_token,
            tokens.refresh_expires_at,
            secure,
        ));
    Ok((jar, Json(TokenResponse::from(&tokens))))
}

fn refresh_token_from_body(body: &[u8]) -> AppResult<Option<String>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let req: RefreshRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))?;
    Ok(req.refresh_token.filter(|t| !t.is_empty()))
}

/// `POST /auth/logout` — end the caller's current session.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    state.sessions.logout(identity.session_id).await?;
    Ok((
        clear_auth_cookies(jar, state.config.production),
        Json(MessageResponse::new("Logged out")),
    ))
}

/// `POST /auth/logout-all` — end every session of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<LogoutAllResponse>)> {
    let revoked = state.sessions.logout_all(identity.user_id).await?;
    Ok((
        clear_auth_cookies(jar, state.config.production),
        Json(LogoutAllResponse {
            message: "Logged out from all devices".into(),
            sessions_revoked: revoked,
        }),
    ))
}

/// `GET /auth/me` — profile of the caller.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
) -> AppResult<Json<UserResponse>> {
    let user = state.sessions.get_me(identity.user_id).await?;
    Ok(Json(UserResponse { user }))
}

/// `POST /auth/change-password`
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
    AppJson(body): AppJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .sessions
        .change_password(identity.user_id, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed")))
}

/// `POST /auth/reset-password` — always answers the same way.
pub async fn request_reset_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .sessions
        .request_password_reset(body.email.trim())
        .await?;
    Ok(Json(MessageResponse::new(
        "If an account exists for that email, a reset code has been sent",
    )))
}

/// `POST /auth/reset-password/verify`
pub async fn verify_reset_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<VerifyResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .sessions
        .verify_password_reset(body.email.trim(), body.otp.trim(), &body.new_password)
        .await?;
    Ok(Json(MessageResponse::new(
        "Password has been reset. Please log in again",
    )))
}

/// `GET /auth/sessions` — the caller's active sessions.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<SessionSummary>>> {
    let sessions = state
        .sessions
        .get_user_sessions(identity.user_id, identity.session_id)
        .await?;
    Ok(Json(sessions))
}

/// `DELETE /auth/sessions/{id}` — end one of the caller's own sessions.
pub async fn delete_session_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    state
        .sessions
        .delete_session(session_id, identity.user_id)
        .await?;
    Ok(Json(MessageResponse::new("Session deleted")))
}
