use std::{net::SocketAddr, str::FromStr};

use anyhow::{ensure, Context};
use serde::Deserialize;
use tracing::warn;

/// bcrypt work factor used when `BCRYPT_COST` is not set.
pub const DEFAULT_BCRYPT_COST: u32 = 12;
/// Work factors accepted by bcrypt.
pub const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Signing secret. Issuance refuses to run without one.
    pub secret: Option<String>,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub jwt: JwtConfig,
    pub bcrypt_cost: u32,
}

/// Reads `key`, falling back to `default` when unset. A set but unparsable value is an error.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

/// Rejects costs bcrypt cannot use; warns below the default work factor.
pub fn check_bcrypt_cost(cost: u32) -> anyhow::Result<u32> {
    ensure!(
        BCRYPT_COST_RANGE.contains(&cost),
        "BCRYPT_COST must be between {} and {}, got {cost}",
        BCRYPT_COST_RANGE.start(),
        BCRYPT_COST_RANGE.end()
    );
    if cost < DEFAULT_BCRYPT_COST {
        warn!(cost, "BCRYPT_COST is below {DEFAULT_BCRYPT_COST}; hashes will be weaker");
    }
    Ok(cost)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let host: String = env_or("APP_HOST", "0.0.0.0".to_string())?;
        let port: u16 = env_or("APP_PORT", 8080)?;
        let listen_addr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            issuer: env_or("JWT_ISSUER", "abode".to_string())?,
            audience: env_or("JWT_AUDIENCE", "abode-users".to_string())?,
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24 * 30)?,
        };
        let bcrypt_cost = check_bcrypt_cost(env_or("BCRYPT_COST", DEFAULT_BCRYPT_COST)?)?;
        Ok(Self {
            database_url,
            listen_addr,
            jwt,
            bcrypt_cost,
        })
    }
}
