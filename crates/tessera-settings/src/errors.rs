//! Errors raised while loading task store settings.

use std::path::PathBuf;

use thiserror::Error;

/// Why a worker's settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read task store settings at {}: {source}", path.display())]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The settings file is not JSON, or its values have the wrong shape.
    #[error("task store settings at {} are not usable JSON: {source}", path.display())]
    Json {
        /// File whose content was rejected.
        path: PathBuf,
        /// Underlying parse failure.
        source: serde_json::Error,
    },
    /// A merged value that the connection pool cannot work with.
    #[error("invalid task store setting `{key}`: {reason}")]
    InvalidValue {
        /// camelCase path of the offending key, e.g. `store.poolSize`.
        key: &'static str,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

impl SettingsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
