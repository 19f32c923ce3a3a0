//! Engine configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use warung_db::DbConfig;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub db_max_connections: u32,

    /// Per-request deadline applied to every engine operation
    pub request_timeout: Duration,

    /// Upper bound on graceful shutdown
    pub shutdown_timeout: Duration,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: PathBuf::from("warung.db"),
            db_max_connections: 5,
            request_timeout: Duration::from_secs(15),
            shutdown_timeout: Duration::from_secs(30),
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from any key lookup.
    ///
    /// Unset keys keep their default; set keys must parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            database_path: lookup("WARUNG_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            db_max_connections: parse_or(&lookup, "WARUNG_DB_MAX_CONNECTIONS", defaults.db_max_connections)?,

            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "WARUNG_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),

            shutdown_timeout: Duration::from_secs(parse_or(
                &lookup,
                "WARUNG_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )?),

            log_filter: lookup("WARUNG_LOG").unwrap_or(defaults.log_filter),
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("WARUNG_DB_MAX_CONNECTIONS".to_string()));
        }
        if config.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("WARUNG_REQUEST_TIMEOUT_SECS".to_string()));
        }

        Ok(config)
    }

    /// Pool configuration for this engine.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone()).max_connections(self.db_max_connections)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
