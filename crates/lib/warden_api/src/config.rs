//! API server configuration.

use std::time::Duration;

use warden_core::config::{ConfigError, env_duration};

/// Configuration for the HTTP layer.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Production mode marks auth cookies `Secure`.
    pub production: bool,
    /// Upper bound on a single request.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            pg_connection_url: "postgres://localhost:5432/warden".into(),
            production: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable          | Default                            |
    /// |-------------------|------------------------------------|
    /// | `BIND_ADDR`       | `127.0.0.1:8080`                   |
    /// | `DATABASE_URL`    | `postgres://localhost:5432/warden` |
    /// | `ENV`             | `dev`                              |
    /// | `REQUEST_TIMEOUT` | `30s`                              |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timeout = env_duration(
            "REQUEST_TIMEOUT",
            chrono::Duration::seconds(defaults.request_timeout.as_secs() as i64),
        )?;
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or(defaults.pg_connection_url),
            production: std::env::var("ENV").is_ok_and(|v| v.eq_ignore_ascii_case("production")),
            request_timeout: timeout.to_std().map_err(|e| ConfigError::Invalid {
                key: "REQUEST_TIMEOUT",
                message: e.to_string(),
            })?,
        })
    }
}
