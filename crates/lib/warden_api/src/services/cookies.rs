//! Cookie service — set/clear httpOnly auth cookies.
//!
//! The refresh cookie is scoped to `/auth` so it only travels to the
//! endpoints that consume it.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

const ACCESS_COOKIE_PATH: &str = "/";
const REFRESH_COOKIE_PATH: &str = "/auth";

fn auth_cookie(
    name: &'static str,
    value: String,
    path: &'static str,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(path)
        .max_age(max_age)
        .build()
}

/// Seconds until `expires_at`, never negative.
fn max_age_until(expires_at: DateTime<Utc>) -> Duration {
    Duration::seconds((expires_at - Utc::now()).num_seconds().max(0))
}

/// Build a httpOnly cookie for the access token.
pub fn access_cookie(token: &str, expires_at: DateTime<Utc>, secure: bool) -> Cookie<'static> {
    auth_cookie(
        ACCESS_COOKIE,
        token.to_string(),
        ACCESS_COOKIE_PATH,
        max_age_until(expires_at),
        secure,
    )
}

/// Build a httpOnly cookie for the refresh token. Lifetime follows the
/// session, so "stay signed in" carries through.
pub fn refresh_cookie(token: &str, expires_at: DateTime<Utc>, secure: bool) -> Cookie<'static> {
    auth_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        REFRESH_COOKIE_PATH,
        max_age_until(expires_at),
        secure,
    )
}

/// Build expired cookie to clear the access token.
pub fn clear_access_cookie(secure: bool) -> Cookie<'static> {
    auth_cookie(
        ACCESS_COOKIE,
        String::new(),
        ACCESS_COOKIE_PATH,
        Duration::ZERO,
        secure,
    )
}

/// Build expired cookie to clear the refresh token.
pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    auth_cookie(
        REFRESH_COOKIE,
        String::new(),
        REFRESH_COOKIE_PATH,
        Duration::ZERO,
        secure,
    )
}
