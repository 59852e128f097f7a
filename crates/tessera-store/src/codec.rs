//! Row codec between [`TaskRecord`] and `task_info` rows.
//!
//! Encoding yields values in [`TaskColumn::ALL`] order for the insert
//! statement. Decoding reads columns by name, so it works for any statement
//! selecting the full column set. [`decode_projected`] handles arbitrary
//! column subsets and keeps each value's storage class.

use rusqlite::Row;

use crate::types::{ColumnValue, ProjectedRow, TaskColumn, TaskRecord};

/// Insert statement for one record, placeholders in [`TaskColumn::ALL`] order.
pub const INSERT_SQL: &str = "INSERT INTO task_info (task_id, instance_id, job_id, task_name, \
     task_content, address, status, result, failed_cnt, created_time, last_modified_time) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

/// Values for [`INSERT_SQL`].
pub fn encode(record: &TaskRecord) -> [ColumnValue; 11] {
    [
        ColumnValue::from(&record.task_id),
        ColumnValue::from(&record.instance_id),
        ColumnValue::from(&record.job_id),
        ColumnValue::from(&record.task_name),
        ColumnValue::from(record.task_content.as_slice()),
        ColumnValue::from(&record.address),
        ColumnValue::from(record.status),
        ColumnValue::from(record.result.as_ref()),
        ColumnValue::from(record.failed_cnt),
        ColumnValue::from(record.created_time),
        ColumnValue::from(record.last_modified_time),
    ]
}

/// Decode a full row into a record.
///
/// `NULL` in a text column reads as an empty string, except `result`,
/// which stays `None`. A `NULL` payload reads as empty.
pub fn decode(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        task_id: text(row, TaskColumn::TaskId)?,
        instance_id: text(row, TaskColumn::InstanceId)?,
        job_id: text(row, TaskColumn::JobId)?,
        task_name: text(row, TaskColumn::TaskName)?,
        task_content: row
            .get::<_, Option<Vec<u8>>>(TaskColumn::TaskContent.as_sql())?
            .unwrap_or_default(),
        address: text(row, TaskColumn::Address)?,
        status: row
            .get::<_, Option<i32>>(TaskColumn::Status.as_sql())?
            .unwrap_or_default(),
        result: row.get(TaskColumn::Result.as_sql())?,
        failed_cnt: row
            .get::<_, Option<i32>>(TaskColumn::FailedCnt.as_sql())?
            .unwrap_or_default(),
        created_time: row
            .get::<_, Option<i64>>(TaskColumn::CreatedTime.as_sql())?
            .unwrap_or_default(),
        last_modified_time: row
            .get::<_, Option<i64>>(TaskColumn::LastModifiedTime.as_sql())?
            .unwrap_or_default(),
    })
}

fn text(row: &Row<'_>, column: TaskColumn) -> rusqlite::Result<String> {
    Ok(row
        .get::<_, Option<String>>(column.as_sql())?
        .unwrap_or_default())
}

/// Decode a row of any width into a name-keyed map.
///
/// `columns` are the statement's column names in select order.
pub fn decode_projected(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<ProjectedRow> {
    let mut out = ProjectedRow::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        let value: ColumnValue = row.get(idx)?;
        let _ = out.insert(name.clone(), value);
    }
    Ok(out)
}
