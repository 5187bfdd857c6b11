use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Process configuration, read once at startup and handed to the components
/// that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub store_timeout: Duration,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub cors_origins: Vec<String>,
    /// Bootstrap admin created at startup when both are set and the email
    /// is not taken yet.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(s) if !s.trim().is_empty() => s,
            _ => {
                warn!("JWT_SECRET not set, issuing tokens with a per-process random secret");
                uuid::Uuid::new_v4().simple().to_string()
            }
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self {
            port: try_load("PORT", "8080")?,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            db_max_connections: try_load("DB_MAX_CONNECTIONS", "10")?,
            store_timeout: Duration::from_secs(try_load("STORE_TIMEOUT_SECS", "10")?),
            jwt_secret,
            jwt_expiry_hours: try_load("JWT_EXPIRY_HOURS", "72")?,
            cors_origins,
            admin_email: env::var("ADMIN_EMAIL").ok().filter(|s| !s.is_empty()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value {raw:?}"))
}
