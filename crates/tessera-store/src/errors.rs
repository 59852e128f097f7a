//! Error types for the task store.
//!
//! [`TaskStoreError`] separates the failures a caller can act on: the store
//! could not be reached, a key or check constraint rejected a write, the
//! caller's condition was unusable, or a stored row could not be decoded.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors returned by task store operations.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    /// No connection could be acquired, or the statement could not execute.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A write was rejected by the unique key or a check constraint.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The caller's condition or assignment cannot be turned into a statement.
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// A stored row holds a value the codec cannot map onto its column.
    #[error("row decode error: {0}")]
    RowDecode(String),
}

impl TaskStoreError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedQuery(message.into())
    }
}

impl From<rusqlite::Error> for TaskStoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ffi_err, message)
                if ffi_err.code == ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(message.unwrap_or_else(|| ffi_err.to_string()))
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnName(_) => Self::RowDecode(err.to_string()),
            other => Self::StorageUnavailable(Box::new(other)),
        }
    }
}

impl From<r2d2::Error> for TaskStoreError {
    fn from(err: r2d2::Error) -> Self {
        Self::StorageUnavailable(Box::new(err))
    }
}

impl From<std::io::Error> for TaskStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(Box::new(err))
    }
}

/// Convenience type alias for task store results.
pub type Result<T> = std::result::Result<T, TaskStoreError>;
