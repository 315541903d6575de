use std::{env, str::FromStr};

use chrono::Duration;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub admin_email: String,
    pub admin_password: String,
    pub session_ttl: Duration,
    pub db_acquire_timeout: std::time::Duration,
    pub seed_sample_data: bool,
}

#[derive(Debug, Error)]
#[error("invalid value {value:?} for {key}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let session_minutes: i64 = parse(&lookup, "SESSION_TTL_MINUTES", 480)?;
        let acquire_secs: u64 = parse(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 10)?;

        Ok(Self {
            database_url: string("DATABASE_URL", "sqlite://./data/studiolux.db"),
            bind_addr: string("BIND_ADDR", "0.0.0.0"),
            port: parse(&lookup, "PORT", 8080)?,
            admin_email: string("ADMIN_EMAIL", "admin@studiolux.local"),
            admin_password: string("ADMIN_PASSWORD", "admin"),
            session_ttl: Duration::minutes(session_minutes.max(1)),
            db_acquire_timeout: std::time::Duration::from_secs(acquire_secs),
            seed_sample_data: parse(&lookup, "SEED_SAMPLE_DATA", true)?,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError { key, value }),
        _ => Ok(default),
    }
}
