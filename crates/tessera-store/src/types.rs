//! Task record, column catalogue, and the typed column value union.

use indexmap::IndexMap;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

/// Current UTC time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One attempt-unit of a job instance, as persisted in `task_info`.
///
/// `(instance_id, task_id)` is unique. `status` is owned by the calling
/// layer; the store treats it as an opaque small integer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier, unique within its instance.
    pub task_id: String,
    /// Owning job-instance run.
    pub instance_id: String,
    /// Parent job definition.
    pub job_id: String,
    /// Human-readable label.
    pub task_name: String,
    /// Serialized task parameters. Empty when the task carries none.
    pub task_content: Vec<u8>,
    /// Worker address currently or last assigned to the task.
    pub address: String,
    /// Lifecycle state.
    pub status: i32,
    /// Execution output, set once the task finishes.
    pub result: Option<String>,
    /// Failures observed so far.
    pub failed_cnt: i32,
    /// Insert time, epoch milliseconds.
    pub created_time: i64,
    /// Last mutation time, epoch milliseconds.
    pub last_modified_time: i64,
}

impl TaskRecord {
    /// A fresh record stamped with the current time.
    pub fn new(instance_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            task_id: task_id.into(),
            instance_id: instance_id.into(),
            created_time: now,
            last_modified_time: now,
            ..Self::default()
        }
    }
}

/// Storage class a column holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// Raw bytes.
    Blob,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Blob => "blob",
        })
    }
}

/// Columns of the `task_info` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskColumn {
    /// `task_id`
    TaskId,
    /// `instance_id`
    InstanceId,
    /// `job_id`
    JobId,
    /// `task_name`
    TaskName,
    /// `task_content`
    TaskContent,
    /// `address`
    Address,
    /// `status`
    Status,
    /// `result`
    Result,
    /// `failed_cnt`
    FailedCnt,
    /// `created_time`
    CreatedTime,
    /// `last_modified_time`
    LastModifiedTime,
}

impl TaskColumn {
    /// Every column, in table order.
    pub const ALL: [Self; 11] = [
        Self::TaskId,
        Self::InstanceId,
        Self::JobId,
        Self::TaskName,
        Self::TaskContent,
        Self::Address,
        Self::Status,
        Self::Result,
        Self::FailedCnt,
        Self::CreatedTime,
        Self::LastModifiedTime,
    ];

    /// Column name as it appears in SQL.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::TaskId => "task_id",
            Self::InstanceId => "instance_id",
            Self::JobId => "job_id",
            Self::TaskName => "task_name",
            Self::TaskContent => "task_content",
            Self::Address => "address",
            Self::Status => "status",
            Self::Result => "result",
            Self::FailedCnt => "failed_cnt",
            Self::CreatedTime => "created_time",
            Self::LastModifiedTime => "last_modified_time",
        }
    }

    /// Storage class of the column.
    pub fn kind(self) -> ColumnKind {
        match self {
            Self::TaskContent => ColumnKind::Blob,
            Self::Status | Self::FailedCnt | Self::CreatedTime | Self::LastModifiedTime => {
                ColumnKind::Integer
            }
            Self::TaskId
            | Self::InstanceId
            | Self::JobId
            | Self::TaskName
            | Self::Address
            | Self::Result => ColumnKind::Text,
        }
    }

    /// Look a column up by its SQL name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_sql() == name)
    }
}

impl std::fmt::Display for TaskColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single column value with its native storage class preserved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ColumnValue {
    /// SQL `NULL`.
    Null,
    /// Integer column value.
    Integer(i64),
    /// Text column value.
    Text(String),
    /// Binary column value.
    Blob(Vec<u8>),
}

impl ColumnValue {
    /// Storage class of the value, `None` for `NULL`.
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ColumnKind::Integer),
            Self::Text(_) => Some(ColumnKind::Text),
            Self::Blob(_) => Some(ColumnKind::Blob),
        }
    }

    /// Whether the value is `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Byte content, if this is a blob value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for ColumnValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for ColumnValue {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl ToSql for ColumnValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl FromSql for ColumnValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Self::Null),
            ValueRef::Integer(n) => Ok(Self::Integer(n)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Self::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(bytes) => Ok(Self::Blob(bytes.to_vec())),
            // no task_info column stores floating point
            ValueRef::Real(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// One row of a projected query, keyed by column name in select order.
pub type ProjectedRow = IndexMap<String, ColumnValue>;
