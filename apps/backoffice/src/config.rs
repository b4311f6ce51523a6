//! Backoffice configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                    | Default              |
//! |-----------------------------|----------------------|
//! | `DEFTER_DATABASE_PATH`      | `./data/defter.db`   |
//! | `DEFTER_MAX_CONNECTIONS`    | `5`                  |
//! | `DEFTER_BRANCH_ID`          | unset (no branch)    |
//! | `DEFTER_LOG_LEVEL`          | `info`               |
//! | `DEFTER_NUMBER_RETRY_LIMIT` | `3`                  |

use std::env;
use std::path::PathBuf;

use defter_db::DbConfig;
use serde::{Deserialize, Serialize};

/// Backoffice configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackofficeConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// Acting branch for commands issued through the driver binary
    pub branch_id: Option<i64>,

    /// Default tracing filter when RUST_LOG is not set
    pub log_level: String,

    /// Extra attempts when an allocated invoice number collides
    pub number_retry_limit: u32,
}

impl Default for BackofficeConfig {
    fn default() -> Self {
        BackofficeConfig {
            database_path: PathBuf::from("./data/defter.db"),
            max_connections: 5,
            branch_id: None,
            log_level: "info".to_string(),
            number_retry_limit: 3,
        }
    }
}

impl BackofficeConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = BackofficeConfig::default();

        let config = BackofficeConfig {
            database_path: lookup("DEFTER_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            max_connections: lookup("DEFTER_MAX_CONNECTIONS")
                .unwrap_or_else(|| defaults.max_connections.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DEFTER_MAX_CONNECTIONS".to_string()))?,

            branch_id: lookup("DEFTER_BRANCH_ID")
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().parse::<i64>())
                .transpose()
                .map_err(|_| ConfigError::InvalidValue("DEFTER_BRANCH_ID".to_string()))?,

            log_level: lookup("DEFTER_LOG_LEVEL").unwrap_or(defaults.log_level),

            number_retry_limit: lookup("DEFTER_NUMBER_RETRY_LIMIT")
                .unwrap_or_else(|| defaults.number_retry_limit.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DEFTER_NUMBER_RETRY_LIMIT".to_string()))?,
        };

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DEFTER_MAX_CONNECTIONS".to_string()));
        }

        if matches!(config.branch_id, Some(id) if id <= 0) {
            return Err(ConfigError::InvalidValue("DEFTER_BRANCH_ID".to_string()));
        }

        Ok(config)
    }

    /// Pool configuration for this backoffice.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.max_connections)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
