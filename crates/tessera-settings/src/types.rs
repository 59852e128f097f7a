//! Settings type definitions.
//!
//! All types serialize as camelCase JSON and default every field, so a
//! settings file only needs the keys it wants to change.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for a worker's task store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TesseraSettings {
    /// Storage connection settings.
    pub store: StoreSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl TesseraSettings {
    /// Reject values the connection pool cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.store.pool_size == 0 {
            return Err(SettingsError::InvalidValue {
                key: "store.poolSize",
                reason: "must be at least 1",
            });
        }
        if self.store.db_path.trim().is_empty() {
            return Err(SettingsError::InvalidValue {
                key: "store.dbPath",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// Connection settings for the local task database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Path of the `SQLite` database file.
    pub db_path: String,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout applied to every connection.
    pub busy_timeout_ms: u64,
    /// How long an operation waits for a pooled connection.
    pub connection_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "tessera/tasks.db".to_string(),
            pool_size: 4,
            busy_timeout_ms: 5_000,
            connection_timeout_ms: 5_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
