//! Service configuration
//!
//! Built once at startup from the environment and handed to the components that
//! need it. Nothing in here is process-global.

use anyhow::{bail, Context, Result};
use jsonwebtoken::Algorithm;
use secrecy::{ExposeSecret, SecretString};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::middleware::RateLimitConfig;

/// Upper bounds on configured token lifetimes.
pub const MAX_ACCESS_TTL_MINUTES: i64 = 24 * 60;
pub const MAX_REFRESH_TTL_DAYS: i64 = 365;

/// Token signing and lifetime settings consumed by the Token Authority.
#[derive(Debug)]
pub struct TokenSettings {
    pub secret: SecretString,
    pub algorithm: Algorithm,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

impl TokenSettings {
    /// Settings for tests and tooling: HS256 with the given secret, 30 minutes / 7 days.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
            algorithm: Algorithm::HS256,
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
        }
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_minutes.saturating_mul(60)
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_days.saturating_mul(86_400)
    }

    /// Signing secret bytes. Only the JWT handler reads these.
    pub(crate) fn secret_bytes(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }
}

/// Account seeded with the Admin role on first start.
#[derive(Debug)]
pub struct SuperuserSettings {
    pub email: String,
    pub password: SecretString,
    pub full_name: String,
}

/// Full service settings.
#[derive(Debug)]
pub struct Settings {
    pub project_name: String,
    pub api_prefix: String,
    pub bind_addr: String,
    pub database_path: String,
    pub cors_origins: Vec<String>,
    pub bcrypt_cost: u32,
    pub token: TokenSettings,
    pub first_superuser: Option<SuperuserSettings>,
    pub auth_rate_limit: RateLimitConfig,
}

impl Settings {
    /// Load settings from `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = get("SECRET_KEY").context("SECRET_KEY must be set")?;
        if secret.len() < 32 {
            tracing::warn!("SECRET_KEY is shorter than 32 bytes; use a longer random secret");
        }

        let algorithm = parse_algorithm(get("ALGORITHM").as_deref().unwrap_or("HS256"))?;
        let access_ttl_minutes: i64 = parse_or(&get, "ACCESS_TOKEN_EXPIRE_MINUTES", 30)?;
        let refresh_ttl_days: i64 = parse_or(&get, "REFRESH_TOKEN_EXPIRE_DAYS", 7)?;
        if access_ttl_minutes <= 0 || refresh_ttl_days <= 0 {
            bail!("token lifetimes must be positive");
        }
        if access_ttl_minutes > MAX_ACCESS_TTL_MINUTES {
            bail!(
                "ACCESS_TOKEN_EXPIRE_MINUTES must be at most {}, got {}",
                MAX_ACCESS_TTL_MINUTES,
                access_ttl_minutes
            );
        }
        if refresh_ttl_days > MAX_REFRESH_TTL_DAYS {
            bail!(
                "REFRESH_TOKEN_EXPIRE_DAYS must be at most {}, got {}",
                MAX_REFRESH_TTL_DAYS,
                refresh_ttl_days
            );
        }

        let bcrypt_cost: u32 = parse_or(&get, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {}", bcrypt_cost);
        }

        let cors_origins = get("BACKEND_CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:8000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let first_superuser = get("FIRST_SUPERUSER_PASSWORD").map(|password| SuperuserSettings {
            email: get("FIRST_SUPERUSER_EMAIL").unwrap_or_else(|| "admin@example.com".to_string()),
            password: SecretString::from(password),
            full_name: get("FIRST_SUPERUSER_FULL_NAME").unwrap_or_else(|| "Admin User".to_string()),
        });

        let defaults = RateLimitConfig::default();
        let auth_rate_limit = RateLimitConfig {
            max_requests: parse_or(&get, "AUTH_RATE_LIMIT_MAX", defaults.max_requests)?,
            window: Duration::from_secs(parse_or(
                &get,
                "AUTH_RATE_LIMIT_WINDOW_SECS",
                defaults.window.as_secs(),
            )?),
            burst: parse_or(&get, "AUTH_RATE_LIMIT_BURST", defaults.burst)?,
        };
        if auth_rate_limit.window.is_zero() {
            bail!("AUTH_RATE_LIMIT_WINDOW_SECS must be positive");
        }

        Ok(Self {
            project_name: get("PROJECT_NAME").unwrap_or_else(|| "JWT Auth Service".to_string()),
            api_prefix: get("API_V1_STR").unwrap_or_else(|| "/api/v1".to_string()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "./app.db".to_string()),
            cors_origins,
            bcrypt_cost,
            token: TokenSettings {
                secret: SecretString::from(secret),
                algorithm,
                access_ttl_minutes,
                refresh_ttl_days,
            },
            first_superuser,
            auth_rate_limit,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        None => Ok(default),
    }
}

/// Only symmetric HMAC algorithms are accepted; the secret is shared.
fn parse_algorithm(raw: &str) -> Result<Algorithm> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => bail!("ALGORITHM must be one of HS256, HS384, HS512 (got {})", other),
    }
}
