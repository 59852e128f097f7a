//! DDL for the `task_info` table.
//!
//! The table is owned by the gateway. [`initialize`] is destructive and
//! meant for first-run bootstrap; [`ensure`] only creates what is missing.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::errors::Result;

/// Name of the task table.
pub const TABLE: &str = "task_info";

/// Name of the unique `(instance_id, task_id)` index.
pub const KEY_INDEX: &str = "task_info_pkey";

const DROP_TABLE: &str = "DROP TABLE IF EXISTS task_info;";

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS task_info (
    task_id VARCHAR(20) NOT NULL CHECK (length(task_id) <= 20),
    instance_id VARCHAR(20) NOT NULL CHECK (length(instance_id) <= 20),
    job_id VARCHAR(20) CHECK (length(job_id) <= 20),
    task_name VARCHAR(20) CHECK (length(task_name) <= 20),
    task_content BLOB,
    address VARCHAR(20) CHECK (length(address) <= 20),
    status INTEGER,
    result TEXT,
    failed_cnt INTEGER,
    created_time BIGINT,
    last_modified_time BIGINT,
    CHECK (created_time <= last_modified_time)
);

CREATE UNIQUE INDEX IF NOT EXISTS task_info_pkey
    ON task_info(instance_id, task_id);
";

/// Drop and recreate the task table. All stored tasks are lost.
pub fn initialize(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(DROP_TABLE)?;
    tx.execute_batch(CREATE_TABLE)?;
    tx.commit()?;
    info!(table = TABLE, "task table recreated");
    Ok(())
}

/// Create the task table and its key index if they do not exist.
///
/// Returns whether the table had to be created.
pub fn ensure(conn: &Connection) -> Result<bool> {
    let existed = table_exists(conn)?;
    conn.execute_batch(CREATE_TABLE)?;
    if existed {
        debug!(table = TABLE, "task table present");
    } else {
        info!(table = TABLE, "task table created");
    }
    Ok(!existed)
}

/// Whether the task table exists.
pub fn table_exists(conn: &Connection) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [TABLE],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}
