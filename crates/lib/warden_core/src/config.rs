//! Auth and cache configuration.
//!
//! Built once from the environment at startup and handed to the token codec,
//! the session service and the authenticator. Nothing reads the environment
//! after construction.

use chrono::Duration;
use thiserror::Error;

use crate::auth::password::DEFAULT_BCRYPT_COST;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Token and credential settings.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// HS256 signing secret.
    pub jwt_secret: String,
    pub issuer: String,
    /// Accepted audiences. Tokens are issued for the first entry.
    pub audience: Vec<String>,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    /// Refresh lifetime when the user ticks "stay signed in".
    pub stay_signed_in_lifetime: Duration,
    pub password_reset_otp_lifetime: Duration,
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    /// Config with the documented defaults and the given secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            issuer: "warden".into(),
            audience: vec!["warden".into()],
            access_token_lifetime: Duration::minutes(15),
            refresh_token_lifetime: Duration::hours(168),
            stay_signed_in_lifetime: Duration::hours(720),
            password_reset_otp_lifetime: Duration::minutes(15),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                      | Default   |
    /// |-------------------------------|-----------|
    /// | `JWT_SECRET`                  | required  |
    /// | `JWT_ISSUER`                  | `warden`  |
    /// | `JWT_AUDIENCE` (comma list)   | `warden`  |
    /// | `ACCESS_TOKEN_LIFETIME`       | `15m`     |
    /// | `REFRESH_TOKEN_LIFETIME`      | `168h`    |
    /// | `STAY_SIGNED_IN_LIFETIME`     | `720h`    |
    /// | `PASSWORD_RESET_OTP_LIFETIME` | `15m`     |
    /// | `BCRYPT_COST`                 | `12`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let defaults = Self::with_secret(secret);
        let audience = match std::env::var("JWT_AUDIENCE") {
            Ok(raw) => {
                let list: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect();
                if list.is_empty() {
                    return Err(ConfigError::Invalid {
                        key: "JWT_AUDIENCE",
                        message: "at least one audience is required".into(),
                    });
                }
                list
            }
            Err(_) => defaults.audience.clone(),
        };

        let bcrypt_cost = env_u32("BCRYPT_COST", defaults.bcrypt_cost)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                message: format!("{bcrypt_cost} is outside 4..=31"),
            });
        }

        Ok(Self {
            issuer: std::env::var("JWT_ISSUER").unwrap_or(defaults.issuer.clone()),
            audience,
            access_token_lifetime: env_duration(
                "ACCESS_TOKEN_LIFETIME",
                defaults.access_token_lifetime,
            )?,
            refresh_token_lifetime: env_duration(
                "REFRESH_TOKEN_LIFETIME",
                defaults.refresh_token_lifetime,
            )?,
            stay_signed_in_lifetime: env_duration(
                "STAY_SIGNED_IN_LIFETIME",
                defaults.stay_signed_in_lifetime,
            )?,
            password_reset_otp_lifetime: env_duration(
                "PASSWORD_RESET_OTP_LIFETIME",
                defaults.password_reset_otp_lifetime,
            )?,
            bcrypt_cost,
            jwt_secret: defaults.jwt_secret,
        })
    }
}

/// Which cache implementation to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Optional read-through cache settings.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub address: String,
    pub password: Option<String>,
    pub db: u32,
    /// Upper bound on entry lifetime.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: CacheBackend::Redis,
            address: "localhost:6379".into(),
            password: None,
            db: 0,
            ttl: Duration::hours(1),
        }
    }
}

impl CacheConfig {
    /// Reads `ENABLE_CACHE`, `CACHE_BACKEND`, `REDIS_ADDRESS`, `REDIS_PASSWORD`,
    /// `REDIS_DB` and `CACHE_TTL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let enabled = env_bool("ENABLE_CACHE", false)?;
        if !enabled {
            return Ok(defaults);
        }

        let backend = match std::env::var("CACHE_BACKEND").as_deref() {
            Err(_) | Ok("redis") => CacheBackend::Redis,
            Ok("memory") => CacheBackend::Memory,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    key: "CACHE_BACKEND",
                    message: format!("expected `redis` or `memory`, got `{other}`"),
                });
            }
        };

        Ok(Self {
            enabled,
            backend,
            address: std::env::var("REDIS_ADDRESS").unwrap_or(defaults.address),
            password: std::env::var("REDIS_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
            db: env_u32("REDIS_DB", defaults.db)?,
            ttl: env_duration("CACHE_TTL", defaults.ttl)?,
        })
    }

    /// Connection URL for the Redis client.
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{pw}@{}/{}", self.address, self.db),
            None => format!("redis://{}/{}", self.address, self.db),
        }
    }
}

/// Parse durations of the form `<integer><unit>` with unit `s`, `m`, `h` or `d`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = raw.split_at(split);
    let n: i64 = digits.parse().ok()?;
    match unit {
        "s" => Some(Duration::seconds(n)),
        "m" => Some(Duration::minutes(n)),
        "h" => Some(Duration::hours(n)),
        "d" => Some(Duration::days(n)),
        _ => None,
    }
}

pub fn env_duration(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => parse_duration(&raw)
            .filter(|d| *d > Duration::zero())
            .ok_or_else(|| ConfigError::Invalid {
                key,
                message: format!("`{raw}` is not a positive duration (e.g. 15m, 168h)"),
            }),
    }
}

pub fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                message: format!("`{raw}` is not a boolean"),
            }),
        },
    }
}

pub fn env_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            message: format!("`{raw}` is not an unsigned integer"),
        }),
    }
}
