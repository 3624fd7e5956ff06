//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use warden_core::auth::guard::Authenticator;
use warden_core::auth::service::SessionService;
use warden_core::models::auth::Role;

use crate::config::ApiConfig;
use crate::handlers::{admin, auth};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle operations.
    pub sessions: SessionService,
    /// Request-time token verification.
    pub authenticator: Authenticator,
    /// API configuration.
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(sessions: SessionService, config: ApiConfig) -> Self {
        Self {
            authenticator: Authenticator::from_service(&sessions),
            sessions,
            config: Arc::new(config),
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/reset-password", post(auth::request_reset_handler))
        .route(
            "/auth/reset-password/verify",
            post(auth::verify_reset_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/logout-all", post(auth::logout_all_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/change-password", post(auth::change_password_handler))
        .route("/auth/sessions", get(auth::list_sessions_handler))
        .route("/auth/sessions/{id}", delete(auth::delete_session_handler))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Administrative routes (auth, then role gate)
    let administrative = Router::new()
        .route("/auth/block-user/{id}", post(admin::block_user_handler))
        .route("/auth/unblock-user/{id}", post(admin::unblock_user_handler))
        .route(
            "/auth/logout-all-user-sessions/{id}",
            post(admin::logout_user_sessions_handler),
        )
        .route_layer(from_fn_with_state(
            Role::ADMINISTRATIVE,
            middleware::role::require_role,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let timeout = state.config.request_timeout;
    Router::new()
        .merge(public)
        .merge(protected)
        .merge(administrative)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
