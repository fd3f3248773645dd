//! Application configuration loaded from environment variables.

use std::time::Duration;

use enrollment_engine::EngineConfig;

use crate::errors::{RegistrarError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Upper bound on pooled SQLite connections
    pub max_db_connections: u32,
    /// Internal retries after a transaction conflict before giving up
    pub conflict_retries: u32,
    /// Base backoff between conflict retries, in milliseconds
    pub retry_backoff_ms: u64,
    /// How often (in seconds) the background audit runs; `0` disables it
    pub audit_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; missing keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./summer_school.db".to_string()),
            api_port: parse_or(&lookup, "API_PORT", 3001)?,
            max_db_connections: parse_or(&lookup, "MAX_DB_CONNECTIONS", 5)?,
            conflict_retries: parse_or(&lookup, "CONFLICT_RETRIES", 3)?,
            retry_backoff_ms: parse_or(&lookup, "RETRY_BACKOFF_MS", 10)?,
            audit_interval_secs: parse_or(&lookup, "AUDIT_INTERVAL_SECS", 60)?,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            conflict_retries: self.conflict_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RegistrarError::Config(format!("Invalid {key}: {raw}"))),
        None => Ok(default),
    }
}
