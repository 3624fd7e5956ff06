//! Integration tests — build the router over in-process adapters and drive it
//! with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use chrono::Duration;
use serde_json::{Value, json};
use tower::ServiceExt;
use warden_api::{AppState, config::ApiConfig};
use warden_core::auth::notifier::LogNotifier;
use warden_core::auth::service::SessionService;
use warden_core::cache::CacheLayer;
use warden_core::cache::memory::MemoryAuthCache;
use warden_core::config::AuthConfig;
use warden_core::store::memory::MemoryAuthStore;

const PASSWORD: &str = "password123";

fn state_with(auth: AuthConfig) -> AppState {
    let sessions = SessionService::new(
        Arc::new(auth),
        Arc::new(MemoryAuthStore::new()),
        CacheLayer::new(Arc::new(MemoryAuthCache::new()), Duration::hours(1)),
        Arc::new(LogNotifier),
    );
    AppState::new(sessions, ApiConfig::default())
}

fn test_state() -> AppState {
    let mut auth = AuthConfig::with_secret("api-test-secret");
    auth.bcrypt_cost = 4;
    state_with(auth)
}

async fn send(state: &AppState, req: Request<Body>) -> Response<Body> {
    warden_api::router(state.clone())
        .oneshot(req)
        .await
        .expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(resp: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

fn set_cookies(resp: &Response<Body>) -> Vec<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

fn cookie<'a>(cookies: &'a [String], name: &str) -> &'a str {
    cookies
        .iter()
        .find(|c| c.starts_with(&format!("{name}=")))
        .unwrap_or_else(|| panic!("no {name} cookie in {cookies:?}"))
}

async fn register(state: &AppState, email: &str) -> String {
    let resp = send(
        state,
        post_json(
            "/auth/register",
            json!({"first_name": "Test", "last_name": "User", "email": email, "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await["user"]["id"].as_str().unwrap().to_string()
}

/// Returns the login response body.
async fn login(state: &AppState, email: &str, user_agent: &str) -> Value {
    let mut req = post_json("/auth/login", json!({"email": email, "password": PASSWORD}));
    req.headers_mut()
        .insert(header::USER_AGENT, user_agent.parse().unwrap());
    let resp = send(state, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

async fn owner_token(state: &AppState) -> String {
    state
        .sessions
        .bootstrap_owner("owner@example.com", PASSWORD)
        .await
        .unwrap();
    login(state, "owner@example.com", "curl/8.0").await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn login_sets_scoped_http_only_cookies() {
    let state = test_state();
    register(&state, "a@example.com").await;

    let resp = send(
        &state,
        post_json(
            "/auth/login",
            json!({"email": "a@example.com", "password": PASSWORD, "stay_signed_in": true}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookies = set_cookies(&resp);
    let access = cookie(&cookies, "access_token");
    let refresh = cookie(&cookies, "refresh_token");
    for c in [access, refresh] {
        assert!(c.contains("HttpOnly"), "{c}");
        assert!(c.contains("SameSite=Strict"), "{c}");
        assert!(!c.contains("Secure"), "{c}");
    }
    assert!(access.contains("Path=/;") || access.ends_with("Path=/"), "{access}");
    assert!(refresh.contains("Path=/auth"), "{refresh}");

    let json = body_json(resp).await;
    assert_eq!(json["user"]["email"], "a@example.com");
    assert_eq!(json["user"]["role"], "customer");
    assert!(json["access_token"].is_string());
    assert!(json["refresh_token"].is_string());
    assert!(json["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn bad_credentials_are_one_error() {
    let state = test_state();
    register(&state, "b@example.com").await;

    let wrong = send(
        &state,
        post_json("/auth/login", json!({"email": "b@example.com", "password": "nope-nope"})),
    )
    .await;
    let unknown = send(
        &state,
        post_json("/auth/login", json!({"email": "x@example.com", "password": PASSWORD})),
    )
    .await;

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await, body_json(unknown).await);
}

#[tokio::test]
async fn me_accepts_bearer_or_cookie() {
    let state = test_state();
    register(&state, "c@example.com").await;
    let login = login(&state, "c@example.com", "curl/8.0").await;
    let token = login["access_token"].as_str().unwrap();

    let resp = send(&state, with_bearer("GET", "/auth/me", token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["user"]["email"], "c@example.com");

    let req = Request::builder()
        .uri("/auth/me")
        .header(header::COOKIE, format!("access_token={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&state, req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_token_is_rejected() {
    let state = test_state();
    let req = Request::builder()
        .uri("/auth/me")
        .body(Body::empty())
        .unwrap();
    let resp = send(&state, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "authentication_error");
}

#[tokio::test]
async fn expired_access_token_is_reported_as_expired() {
    let mut auth = AuthConfig::with_secret("api-test-secret");
    auth.bcrypt_cost = 4;
    auth.access_token_lifetime = Duration::seconds(-5);
    let state = state_with(auth);
    register(&state, "d@example.com").await;
    let login = login(&state, "d@example.com", "curl/8.0").await;

    let resp = send(
        &state,
        with_bearer("GET", "/auth/me", login["access_token"].as_str().unwrap()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "token_expired");
}

#[tokio::test]
async fn refresh_via_cookie_rotates_and_rejects_replay() {
    let state = test_state();
    register(&state, "e@example.com").await;
    let login = login(&state, "e@example.com", "curl/8.0").await;
    let old = login["refresh_token"].as_str().unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(header::COOKIE, format!("refresh_token={old}"))
        .body(Body::empty())
        .unwrap();
    let resp = send(&state, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies = set_cookies(&resp);
    cookie(&cookies, "access_token");
    cookie(&cookies, "refresh_token");
    let fresh = body_json(resp).await;
    assert_ne!(fresh["refresh_token"], login["refresh_token"]);

    let replay = send(&state, post_json("/auth/refresh", json!({"refresh_token": old}))).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    let next = send(
        &state,
        post_json("/auth/refresh", json!({"refresh_token": fresh["refresh_token"]})),
    )
    .await;
    assert_eq!(next.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_without_token_is_unauthorized() {
    let state = test_state();
    let req = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&state, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let state = test_state();
    register(&state, "f@example.com").await;
    let resp = send(
        &state,
        post_json(
            "/auth/register",
            json!({"first_name": "F", "last_name": "G", "email": "f@example.com", "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["error"], "conflict");
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let state = test_state();
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = send(&state, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "validation_error");
}

#[tokio::test]
async fn reset_request_does_not_reveal_accounts() {
    let state = test_state();
    register(&state, "g@example.com").await;

    let known = send(&state, post_json("/auth/reset-password", json!({"email": "g@example.com"}))).await;
    let unknown = send(&state, post_json("/auth/reset-password", json!({"email": "who@example.com"}))).await;
    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(body_json(known).await, body_json(unknown).await);
}

#[tokio::test]
async fn wrong_reset_otp_is_bad_request() {
    let state = test_state();
    register(&state, "h@example.com").await;
    let resp = send(
        &state,
        post_json(
            "/auth/reset-password/verify",
            json!({"email": "h@example.com", "otp": "000000", "new_password": "another-pass"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sessions_list_flags_the_caller() {
    let state = test_state();
    register(&state, "i@example.com").await;
    login(&state, "i@example.com", "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0").await;
    let phone = login(
        &state,
        "i@example.com",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile Safari/604.1",
    )
    .await;

    let resp = send(
        &state,
        with_bearer("GET", "/auth/sessions", phone["access_token"].as_str().unwrap()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let sessions = body_json(resp).await;
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    let current: Vec<_> = sessions.iter().filter(|s| s["is_current"] == true).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0]["device_name"], "Safari on Mobile");
}

#[tokio::test]
async fn deleting_another_users_session_is_forbidden() {
    let state = test_state();
    register(&state, "j@example.com").await;
    register(&state, "k@example.com").await;
    let victim = login(&state, "j@example.com", "curl/8.0").await;
    let intruder = login(&state, "k@example.com", "curl/8.0").await;
    let victim_token = victim["access_token"].as_str().unwrap();

    let resp = send(&state, with_bearer("GET", "/auth/sessions", victim_token)).await;
    let victim_session = body_json(resp).await[0]["id"].as_str().unwrap().to_string();

    let resp = send(
        &state,
        with_bearer(
            "DELETE",
            &format!("/auth/sessions/{victim_session}"),
            intruder["access_token"].as_str().unwrap(),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], "authorization_error");

    let resp = send(&state, with_bearer("GET", "/auth/me", victim_token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_clears_cookies_and_revokes_session() {
    let state = test_state();
    register(&state, "l@example.com").await;
    let login = login(&state, "l@example.com", "curl/8.0").await;
    let token = login["access_token"].as_str().unwrap();

    let resp = send(&state, with_bearer("POST", "/auth/logout", token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies = set_cookies(&resp);
    assert!(cookie(&cookies, "access_token").contains("Max-Age=0"));
    assert!(cookie(&cookies, "refresh_token").contains("Max-Age=0"));

    let resp = send(&state, with_bearer("GET", "/auth/me", token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    let state = test_state();
    let user_id = register(&state, "m@example.com").await;
    let login = login(&state, "m@example.com", "curl/8.0").await;

    let resp = send(
        &state,
        with_bearer(
            "POST",
            &format!("/auth/block-user/{user_id}"),
            login["access_token"].as_str().unwrap(),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_block_revokes_access_immediately() {
    let state = test_state();
    let admin = owner_token(&state).await;
    let user_id = register(&state, "n@example.com").await;
    let first = login(&state, "n@example.com", "curl/8.0").await;
    let second = login(&state, "n@example.com", "curl/8.0").await;

    let resp = send(
        &state,
        with_bearer("POST", &format!("/auth/block-user/{user_id}"), &admin),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    for login in [&first, &second] {
        let resp = send(
            &state,
            with_bearer("GET", "/auth/me", login["access_token"].as_str().unwrap()),
        )
        .await;
        assert!(
            matches!(
                resp.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ),
            "{}",
            resp.status()
        );
    }

    let unblock = send(
        &state,
        with_bearer("POST", &format!("/auth/unblock-user/{user_id}"), &admin),
    )
    .await;
    assert_eq!(unblock.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_block_of_unknown_user_is_not_found() {
    let state = test_state();
    let admin = owner_token(&state).await;
    let resp = send(
        &state,
        with_bearer(
            "POST",
            &format!("/auth/block-user/{}", uuid::Uuid::new_v4()),
            &admin,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_can_log_out_all_user_sessions() {
    let state = test_state();
    let admin = owner_token(&state).await;
    let user_id = register(&state, "o@example.com").await;
    let login = login(&state, "o@example.com", "curl/8.0").await;

    let resp = send(
        &state,
        with_bearer(
            "POST",
            &format!("/auth/logout-all-user-sessions/{user_id}"),
            &admin,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["sessions_revoked"], 1);

    let resp = send(
        &state,
        with_bearer("GET", "/auth/me", login["access_token"].as_str().unwrap()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

fn bearer_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    let mut req = post_json(uri, body);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    req
}

#[tokio::test]
async fn change_password_requires_current_password() {
    let state = test_state();
    register(&state, "p@example.com").await;
    let login = login(&state, "p@example.com", "curl/8.0").await;
    let token = login["access_token"].as_str().unwrap();

    let resp = send(
        &state,
        bearer_json(
            "/auth/change-password",
            token,
            json!({"current_password": "not-my-password", "new_password": "fresh-password"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = send(
        &state,
        bearer_json(
            "/auth/change-password",
            token,
            json!({"current_password": PASSWORD, "new_password": "short"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &state,
        bearer_json(
            "/auth/change-password",
            token,
            json!({"current_password": PASSWORD, "new_password": "fresh-password"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // The calling session survives a password change.
    let resp = send(&state, with_bearer("GET", "/auth/me", token)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let old = send(
        &state,
        post_json("/auth/login", json!({"email": "p@example.com", "password": PASSWORD})),
    )
    .await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
    let new = send(
        &state,
        post_json(
            "/auth/login",
            json!({"email": "p@example.com", "password": "fresh-password"}),
        ),
    )
    .await;
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn change_password_requires_authentication() {
    let state = test_state();
    let resp = send(
        &state,
        post_json(
            "/auth/change-password",
            json!({"current_password": PASSWORD, "new_password": "fresh-password"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_all_revokes_every_device_and_clears_cookies() {
    let state = test_state();
    register(&state, "q@example.com").await;
    let laptop = login(&state, "q@example.com", "curl/8.0").await;
    let phone = login(&state, "q@example.com", "curl/8.0").await;

    let resp = send(
        &state,
        with_bearer("POST", "/auth/logout-all", laptop["access_token"].as_str().unwrap()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies = set_cookies(&resp);
    assert!(cookie(&cookies, "access_token").contains("Max-Age=0"));
    assert!(cookie(&cookies, "refresh_token").contains("Max-Age=0"));
    assert_eq!(body_json(resp).await["sessions_revoked"], 2);

    for login in [&laptop, &phone] {
        let resp = send(
            &state,
            with_bearer("GET", "/auth/me", login["access_token"].as_str().unwrap()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let refresh = send(
            &state,
            post_json(
                "/auth/refresh",
                json!({"refresh_token": login["refresh_token"].as_str().unwrap()}),
            ),
        )
        .await;
        assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn unblock_lets_the_user_sign_in_again() {
    let state = test_state();
    let admin = owner_token(&state).await;
    let user_id = register(&state, "r@example.com").await;

    let resp = send(
        &state,
        with_bearer("POST", &format!("/auth/block-user/{user_id}"), &admin),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let blocked = send(
        &state,
        post_json("/auth/login", json!({"email": "r@example.com", "password": PASSWORD})),
    )
    .await;
    assert_eq!(blocked.status(), StatusCode::UNAUTHORIZED);

    let resp = send(
        &state,
        with_bearer("POST", &format!("/auth/unblock-user/{user_id}"), &admin),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    login(&state, "r@example.com", "curl/8.0").await;
}

#[tokio::test]
async fn unblock_is_admin_only_and_checks_the_user() {
    let state = test_state();
    let admin = owner_token(&state).await;
    let user_id = register(&state, "s@example.com").await;
    let customer = login(&state, "s@example.com", "curl/8.0").await;

    let resp = send(
        &state,
        with_bearer(
            "POST",
            &format!("/auth/unblock-user/{user_id}"),
            customer["access_token"].as_str().unwrap(),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(
        &state,
        with_bearer(
            "POST",
            &format!("/auth/unblock-user/{}", uuid::Uuid::new_v4()),
            &admin,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
