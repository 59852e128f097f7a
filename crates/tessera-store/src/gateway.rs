//! Public task persistence operations.
//!
//! [`TaskGateway`] composes the condition builder, the row codec and the
//! connection pool. Every operation checks out one pooled connection for
//! its own duration and returns it on drop, whatever the exit path.
//!
//! Write operations come in two forms: a `try_*` method returning the
//! classified error, and a boolean wrapper that logs the failure and
//! reports `false`. Reads always return a [`Result`], so "no rows" and
//! "query failed" stay distinguishable.

use std::path::Path;

use indexmap::IndexMap;
use rusqlite::{TransactionBehavior, params_from_iter};
use tessera_settings::StoreSettings;
use tracing::{debug, error, instrument, warn};

use crate::codec::{self, INSERT_SQL};
use crate::condition::{TaskQuery, TaskUpdate};
use crate::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::errors::{Result, TaskStoreError};
use crate::schema;
use crate::types::{ProjectedRow, TaskColumn, TaskRecord, now_millis};

const IN_MEMORY_PATH: &str = ":memory:";

const RESULTS_BY_INSTANCE_SQL: &str =
    "SELECT task_id, result FROM task_info WHERE instance_id = ?1 ORDER BY rowid";

/// Persistence gateway for task records.
///
/// Cheap to share behind an `Arc`; the pool hands each concurrent caller
/// its own connection.
pub struct TaskGateway {
    pool: ConnectionPool,
}

impl TaskGateway {
    /// Wrap an already configured pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open the database named in `settings`.
    ///
    /// `:memory:` opens a private in-memory database on a single pooled
    /// connection, so every operation sees the same data.
    pub fn open(settings: &StoreSettings) -> Result<Self> {
        let config = ConnectionConfig::from(settings);
        let pool = if settings.db_path == IN_MEMORY_PATH {
            connection::new_in_memory(&config)?
        } else {
            connection::new_file(Path::new(&settings.db_path), &config)?
        };
        Ok(Self::new(pool))
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Schema
    // ─────────────────────────────────────────────────────────────────────

    /// Drop and recreate the task table. Every stored task is lost.
    #[instrument(skip_all, fields(operation = "initialize_storage"))]
    pub fn initialize_storage(&self) -> Result<()> {
        let conn = self.conn()?;
        schema::initialize(&conn)
    }

    /// Create the task table if it is missing, keeping existing rows.
    /// Returns whether the table was created.
    #[instrument(skip_all, fields(operation = "ensure_storage"))]
    pub fn ensure_storage(&self) -> Result<bool> {
        let conn = self.conn()?;
        schema::ensure(&conn)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Insert one record. `false` on a duplicate key or storage failure.
    pub fn save(&self, record: &TaskRecord) -> bool {
        match self.try_save(record) {
            Ok(()) => true,
            Err(err) => {
                error!(
                    operation = "save",
                    instance_id = %record.instance_id,
                    task_id = %record.task_id,
                    error = %err,
                    "failed to save task"
                );
                false
            }
        }
    }

    /// Insert one record.
    ///
    /// A duplicate `(instance_id, task_id)` is a
    /// [`TaskStoreError::ConstraintViolation`]; the stored row is untouched.
    #[instrument(
        skip_all,
        fields(operation = "save", instance_id = %record.instance_id, task_id = %record.task_id)
    )]
    pub fn try_save(&self, record: &TaskRecord) -> Result<()> {
        let conn = self.conn()?;
        let affected = conn
            .prepare_cached(INSERT_SQL)?
            .execute(params_from_iter(codec::encode(record).iter()))?;
        if affected != 1 {
            return Err(TaskStoreError::StorageUnavailable(
                format!("insert affected {affected} rows").into(),
            ));
        }
        debug!("task saved");
        Ok(())
    }

    /// Insert a batch of records. `false` if any record failed, in which
    /// case none were stored. An empty batch succeeds.
    pub fn batch_save(&self, records: &[TaskRecord]) -> bool {
        match self.try_batch_save(records) {
            Ok(_) => true,
            Err(err) => {
                error!(
                    operation = "batch_save",
                    batch_size = records.len(),
                    first_task_id = records.first().map(|r| r.task_id.as_str()),
                    error = %err,
                    "failed to save task batch"
                );
                false
            }
        }
    }

    /// Insert a batch of records in one transaction and return how many
    /// were stored.
    ///
    /// The batch is all or nothing. An empty batch returns `0` without
    /// touching the store.
    #[instrument(skip_all, fields(operation = "batch_save", batch_size = records.len()))]
    pub fn try_batch_save(&self, records: &[TaskRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut saved = 0;
        {
            let mut stmt = tx.prepare_cached(INSERT_SQL)?;
            for record in records {
                saved += stmt.execute(params_from_iter(codec::encode(record).iter()))?;
            }
        }
        tx.commit()?;

        debug!(saved, "task batch saved");
        Ok(saved)
    }

    /// Delete the listed tasks of one instance and return how many rows
    /// went. Failures are logged and reported as `0`.
    pub fn batch_delete(&self, instance_id: &str, task_ids: &[String]) -> usize {
        match self.try_batch_delete(instance_id, task_ids) {
            Ok(deleted) => deleted,
            Err(err) => {
                error!(
                    operation = "batch_delete",
                    instance_id,
                    batch_size = task_ids.len(),
                    error = %err,
                    "failed to delete tasks"
                );
                0
            }
        }
    }

    /// Delete the listed tasks of one instance.
    ///
    /// Ids never reach the statement text unescaped. An empty id list
    /// deletes nothing.
    #[instrument(
        skip_all,
        fields(operation = "batch_delete", instance_id = %instance_id, batch_size = task_ids.len())
    )]
    pub fn try_batch_delete<S: AsRef<str>>(
        &self,
        instance_id: &str,
        task_ids: &[S],
    ) -> Result<usize> {
        let stmt = TaskQuery::for_instance(instance_id)
            .is_in(
                TaskColumn::TaskId,
                task_ids.iter().map(|id| AsRef::<str>::as_ref(id)),
            )
            .delete_statement()?;

        let conn = self.conn()?;
        let deleted = conn.execute(&stmt.sql, stmt.bind().as_slice())?;
        debug!(deleted, "tasks deleted");
        Ok(deleted)
    }

    /// Apply `update` to every row matching `query`. `true` iff the
    /// statement ran, however many rows it touched.
    pub fn update(&self, query: &TaskQuery, update: &TaskUpdate) -> bool {
        match self.update_counted(query, update) {
            Ok(_) => true,
            Err(err) => {
                error!(
                    operation = "update",
                    condition = ?query,
                    error = %err,
                    "failed to update tasks"
                );
                false
            }
        }
    }

    /// Apply `update` to every row matching `query` and return the number
    /// of rows changed.
    #[instrument(skip_all, fields(operation = "update", condition = ?query))]
    pub fn update_counted(&self, query: &TaskQuery, update: &TaskUpdate) -> Result<usize> {
        let stmt = query.update_statement(update, now_millis())?;
        let conn = self.conn()?;
        let updated = conn.execute(&stmt.sql, stmt.bind().as_slice())?;
        debug!(updated, "tasks updated");
        Ok(updated)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Full records matching `query`, honouring its ordering and limit.
    #[instrument(skip_all, fields(operation = "query"))]
    pub fn query(&self, query: &TaskQuery) -> Result<Vec<TaskRecord>> {
        self.load_records(query)
            .inspect_err(|err| warn!(error = %err, "task query failed"))
    }

    fn load_records(&self, query: &TaskQuery) -> Result<Vec<TaskRecord>> {
        let stmt = query.select_statement(&TaskColumn::ALL)?;
        let conn = self.conn()?;
        let mut prepared = conn.prepare(&stmt.sql)?;
        let records = prepared
            .query_map(stmt.bind().as_slice(), codec::decode)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(rows = records.len(), "task query complete");
        Ok(records)
    }

    /// Rows matching `query`, reduced to its projected columns.
    ///
    /// Each value keeps its storage class. The query must select at least
    /// one column.
    #[instrument(skip_all, fields(operation = "query_projected"))]
    pub fn query_projected(&self, query: &TaskQuery) -> Result<Vec<ProjectedRow>> {
        self.load_projected(query)
            .inspect_err(|err| warn!(error = %err, "projected task query failed"))
    }

    fn load_projected(&self, query: &TaskQuery) -> Result<Vec<ProjectedRow>> {
        let stmt = query.select_statement(query.projection())?;
        let conn = self.conn()?;
        let mut prepared = conn.prepare(&stmt.sql)?;
        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let rows = prepared
            .query_map(stmt.bind().as_slice(), |row| {
                codec::decode_projected(row, &columns)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(rows = rows.len(), "projected query complete");
        Ok(rows)
    }

    /// `task_id -> result` for every task of an instance, in insertion
    /// order. Tasks without a result map to `None`.
    #[instrument(
        skip_all,
        fields(operation = "fetch_results_by_instance", instance_id = %instance_id)
    )]
    pub fn fetch_results_by_instance(
        &self,
        instance_id: &str,
    ) -> Result<IndexMap<String, Option<String>>> {
        self.load_results(instance_id)
            .inspect_err(|err| warn!(error = %err, "result lookup failed"))
    }

    fn load_results(&self, instance_id: &str) -> Result<IndexMap<String, Option<String>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(RESULTS_BY_INSTANCE_SQL)?;
        let rows = stmt.query_map([instance_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut results = IndexMap::new();
        for row in rows {
            let (task_id, result) = row?;
            let _ = results.insert(task_id, result);
        }
        Ok(results)
    }

    /// Number of rows matching `query`. Ordering and limit are ignored.
    #[instrument(skip_all, fields(operation = "count"))]
    pub fn count(&self, query: &TaskQuery) -> Result<u64> {
        let stmt = query.count_statement()?;
        let conn = self.conn()?;
        let count = conn.query_row(&stmt.sql, stmt.bind().as_slice(), |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use tessera_logging::capture_logs;
    use tracing::Level;

    use super::*;
    use crate::condition::{FailedCntChange, SortOrder};
    use crate::types::ColumnValue;

    fn setup_gateway() -> TaskGateway {
        let pool = connection::new_in_memory(&ConnectionConfig::default()).unwrap();
        let gateway = TaskGateway::new(pool);
        gateway.initialize_storage().unwrap();
        gateway
    }

    fn task(instance_id: &str, task_id: &str) -> TaskRecord {
        TaskRecord {
            job_id: "j1".to_string(),
            task_name: "MAP".to_string(),
            task_content: vec![1, 2, 3],
            address: "10.0.0.1:27777".to_string(),
            created_time: 1_000,
            last_modified_time: 1_000,
            ..TaskRecord::new(instance_id, task_id)
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn save_then_query_returns_same_record() {
        let gateway = setup_gateway();
        let record = TaskRecord {
            task_content: vec![0, 255, 0, 7],
            result: Some("line1\nline2 'quoted'".to_string()),
            ..task("i1", "t1")
        };
        assert!(gateway.save(&record));

        let found = gateway.query(&TaskQuery::for_task("i1", "t1")).unwrap();
        assert_eq!(found, vec![record]);
    }

    #[test]
    fn settle_flow() {
        let gateway = setup_gateway();
        let record = TaskRecord {
            task_id: "t1".to_string(),
            instance_id: "i1".to_string(),
            job_id: "j1".to_string(),
            status: 0,
            failed_cnt: 0,
            ..Default::default()
        };
        assert!(gateway.save(&record));

        let update = TaskUpdate {
            status: Some(2),
            result: Some("ok".to_string()),
            ..Default::default()
        };
        assert!(gateway.update(&TaskQuery::for_task("i1", "t1"), &update));

        let found = gateway.query(&TaskQuery::for_instance("i1")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, 2);
        assert_eq!(found[0].result.as_deref(), Some("ok"));
        assert_eq!(found[0].failed_cnt, 0);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let gateway = setup_gateway();
        assert!(gateway.save(&task("i1", "t1")));

        let second = TaskRecord {
            address: "10.0.0.9:27777".to_string(),
            ..task("i1", "t1")
        };
        let err = gateway.try_save(&second).unwrap_err();
        assert_matches!(err, TaskStoreError::ConstraintViolation(_));
        assert!(!gateway.save(&second));

        let found = gateway.query(&TaskQuery::for_task("i1", "t1")).unwrap();
        assert_eq!(found[0].address, "10.0.0.1:27777");
    }

    #[test]
    fn same_task_id_in_other_instance_is_fine() {
        let gateway = setup_gateway();
        assert!(gateway.save(&task("i1", "t1")));
        assert!(gateway.save(&task("i2", "t1")));
        assert_eq!(gateway.count(&TaskQuery::new().eq(TaskColumn::TaskId, "t1")).unwrap(), 2);
    }

    #[test]
    fn failed_save_is_logged() {
        let gateway = setup_gateway();
        assert!(gateway.save(&task("i1", "t1")));

        let (logs, _guard) = capture_logs();
        assert!(!gateway.save(&task("i1", "t1")));

        let events = logs.find(Level::ERROR, "failed to save task");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("operation"), Some("save"));
        assert_eq!(events[0].field("instance_id"), Some("i1"));
        assert_eq!(events[0].field("task_id"), Some("t1"));
        assert!(logs.has_span("try_save"));
    }

    #[test]
    fn overlong_identifier_is_constraint_violation() {
        let gateway = setup_gateway();
        let record = task("i1", &"x".repeat(21));
        assert_matches!(
            gateway.try_save(&record),
            Err(TaskStoreError::ConstraintViolation(_))
        );
    }

    #[test]
    fn modification_before_creation_is_rejected() {
        let gateway = setup_gateway();
        let record = TaskRecord {
            created_time: 2_000,
            last_modified_time: 1_000,
            ..task("i1", "t1")
        };
        assert_matches!(
            gateway.try_save(&record),
            Err(TaskStoreError::ConstraintViolation(_))
        );
    }

    #[test]
    fn save_without_table_is_storage_unavailable() {
        let pool = connection::new_in_memory(&ConnectionConfig::default()).unwrap();
        let gateway = TaskGateway::new(pool);
        assert_matches!(
            gateway.try_save(&task("i1", "t1")),
            Err(TaskStoreError::StorageUnavailable(_))
        );
        assert!(gateway.query(&TaskQuery::for_instance("i1")).is_err());
    }

    #[test]
    fn empty_batch_is_noop_success() {
        let gateway = setup_gateway();
        assert!(gateway.batch_save(&[]));
        assert_eq!(gateway.try_batch_save(&[]).unwrap(), 0);
        assert_eq!(gateway.count(&TaskQuery::new().ge(TaskColumn::Status, 0)).unwrap(), 0);
    }

    #[test]
    fn batch_save_stores_all() {
        let gateway = setup_gateway();
        let batch: Vec<TaskRecord> = (0..25).map(|i| task("i1", &format!("t{i}"))).collect();
        assert_eq!(gateway.try_batch_save(&batch).unwrap(), 25);
        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 25);
    }

    #[test]
    fn batch_with_duplicate_stores_nothing() {
        let gateway = setup_gateway();
        let batch = vec![task("i1", "t1"), task("i1", "t2"), task("i1", "t1")];

        let (logs, _guard) = capture_logs();
        assert!(!gateway.batch_save(&batch));
        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 0);

        let events = logs.find(Level::ERROR, "failed to save task batch");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("batch_size"), Some("3"));
    }

    #[test]
    fn batch_delete_empty_set_deletes_nothing() {
        let gateway = setup_gateway();
        assert!(gateway.save(&task("i1", "t1")));
        assert_eq!(gateway.batch_delete("i1", &[]), 0);
        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 1);
    }

    #[test]
    fn batch_delete_scopes_to_instance() {
        let gateway = setup_gateway();
        assert!(gateway.batch_save(&[
            task("i1", "t1"),
            task("i1", "t2"),
            task("i1", "t3"),
            task("i2", "t1"),
        ]));

        assert_eq!(gateway.batch_delete("i1", &ids(&["t1", "t2", "missing"])), 2);

        let left = gateway.fetch_results_by_instance("i1").unwrap();
        assert_eq!(left.keys().collect::<Vec<_>>(), ["t3"]);
        assert_eq!(gateway.count(&TaskQuery::for_instance("i2")).unwrap(), 1);
    }

    #[test]
    fn batch_delete_quote_in_id_is_safe() {
        let gateway = setup_gateway();
        assert!(gateway.batch_save(&[task("i1", "a"), task("i1", "b"), task("i1", "it's")]));

        let hostile = ids(&["x' OR '1'='1", "a') OR ('1'='1"]);
        assert_eq!(gateway.batch_delete("i1", &hostile), 0);
        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 3);

        assert_eq!(gateway.try_batch_delete("i1", &["it's"]).unwrap(), 1);
        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 2);
    }

    #[test]
    fn update_counts_matched_rows() {
        let gateway = setup_gateway();
        assert!(gateway.batch_save(&[task("i1", "t1"), task("i1", "t2"), task("i2", "t1")]));

        let update = TaskUpdate {
            address: Some("10.0.0.2:27777".to_string()),
            ..Default::default()
        };
        assert_eq!(
            gateway.update_counted(&TaskQuery::for_instance("i1"), &update).unwrap(),
            2
        );
        assert_eq!(
            gateway.update_counted(&TaskQuery::for_instance("nope"), &update).unwrap(),
            0
        );
        assert!(gateway.update(&TaskQuery::for_instance("nope"), &update));
    }

    #[test]
    fn update_moves_modification_time_forward() {
        let gateway = setup_gateway();
        assert!(gateway.save(&task("i1", "t1")));

        let stale = TaskUpdate {
            status: Some(1),
            last_modified_time: Some(10),
            ..Default::default()
        };
        assert!(gateway.update(&TaskQuery::for_task("i1", "t1"), &stale));
        let found = gateway.query(&TaskQuery::for_task("i1", "t1")).unwrap();
        assert_eq!(found[0].last_modified_time, 1_000);
        assert_eq!(found[0].created_time, 1_000);

        let fresh = TaskUpdate {
            status: Some(2),
            ..Default::default()
        };
        assert!(gateway.update(&TaskQuery::for_task("i1", "t1"), &fresh));
        let found = gateway.query(&TaskQuery::for_task("i1", "t1")).unwrap();
        assert!(found[0].last_modified_time > 1_000);
    }

    #[test]
    fn failed_cnt_never_decreases() {
        let gateway = setup_gateway();
        assert!(gateway.save(&task("i1", "t1")));
        let key = TaskQuery::for_task("i1", "t1");

        let bump = TaskUpdate {
            failed_cnt: Some(FailedCntChange::Increment),
            ..Default::default()
        };
        assert!(gateway.update(&key, &bump));
        assert!(gateway.update(&key, &bump));

        let lower = TaskUpdate {
            failed_cnt: Some(FailedCntChange::Set(1)),
            ..Default::default()
        };
        assert!(gateway.update(&key, &lower));
        assert_eq!(gateway.query(&key).unwrap()[0].failed_cnt, 2);

        let raise = TaskUpdate {
            failed_cnt: Some(FailedCntChange::Set(5)),
            ..Default::default()
        };
        assert!(gateway.update(&key, &raise));
        assert_eq!(gateway.query(&key).unwrap()[0].failed_cnt, 5);
    }

    #[test]
    fn update_without_fields_fails_and_logs() {
        let gateway = setup_gateway();
        let (logs, _guard) = capture_logs();
        assert!(!gateway.update(&TaskQuery::for_instance("i1"), &TaskUpdate::default()));

        let events = logs.find(Level::ERROR, "failed to update tasks");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("operation"), Some("update"));
        assert!(events[0].field("condition").unwrap().contains("\"i1\""));
    }

    #[test]
    fn failed_update_logs_task_key() {
        let pool = connection::new_in_memory(&ConnectionConfig::default()).unwrap();
        let gateway = TaskGateway::new(pool);
        let update = TaskUpdate {
            status: Some(2),
            ..Default::default()
        };

        let (logs, _guard) = capture_logs();
        assert!(!gateway.update(&TaskQuery::for_task("i1", "t1"), &update));

        let events = logs.find(Level::ERROR, "failed to update tasks");
        assert_eq!(events.len(), 1);
        let condition = events[0].field("condition").unwrap();
        assert!(condition.contains("\"i1\""));
        assert!(condition.contains("\"t1\""));
        assert!(events[0].field("error").unwrap().contains("no such table"));
    }

    #[test]
    fn pool_timeout_is_storage_unavailable() {
        let config = ConnectionConfig {
            connection_timeout_ms: 100,
            ..Default::default()
        };
        let gateway = TaskGateway::new(connection::new_in_memory(&config).unwrap());
        gateway.initialize_storage().unwrap();

        let _held = gateway.pool.get().unwrap();
        assert_matches!(
            gateway.try_save(&task("i1", "t1")),
            Err(TaskStoreError::StorageUnavailable(_))
        );
        assert!(!gateway.save(&task("i1", "t1")));
        assert_matches!(
            gateway.query(&TaskQuery::for_instance("i1")),
            Err(TaskStoreError::StorageUnavailable(_))
        );
    }

    #[test]
    fn open_memory_path_shares_one_database() {
        let settings = StoreSettings {
            db_path: ":memory:".to_string(),
            ..Default::default()
        };
        let gateway = TaskGateway::open(&settings).unwrap();
        assert_eq!(gateway.pool.max_size(), 1);

        gateway.initialize_storage().unwrap();
        assert!(gateway.save(&task("i1", "t1")));
        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 1);
    }

    #[test]
    fn query_without_condition_is_malformed() {
        let gateway = setup_gateway();
        assert_matches!(
            gateway.query(&TaskQuery::new()),
            Err(TaskStoreError::MalformedQuery(_))
        );
    }

    #[test]
    fn query_no_match_is_empty_ok() {
        let gateway = setup_gateway();
        assert!(gateway.query(&TaskQuery::for_instance("ghost")).unwrap().is_empty());
    }

    #[test]
    fn query_orders_and_limits() {
        let gateway = setup_gateway();
        let batch: Vec<TaskRecord> = (0..5)
            .map(|i| TaskRecord {
                created_time: 1_000 + i,
                last_modified_time: 1_000 + i,
                ..task("i1", &format!("t{i}"))
            })
            .collect();
        assert!(gateway.batch_save(&batch));

        let found = gateway
            .query(
                &TaskQuery::for_instance("i1")
                    .order_by(TaskColumn::CreatedTime, SortOrder::Desc)
                    .limit(2),
            )
            .unwrap();
        let names: Vec<&str> = found.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(names, ["t4", "t3"]);
    }

    #[test]
    fn projected_query_keeps_types() {
        let gateway = setup_gateway();
        assert!(gateway.save(&TaskRecord {
            status: 3,
            ..task("i1", "t1")
        }));

        let rows = gateway
            .query_projected(&TaskQuery::for_instance("i1").select([
                TaskColumn::TaskId,
                TaskColumn::Status,
                TaskColumn::TaskContent,
                TaskColumn::Result,
            ]))
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(
            row.keys().map(String::as_str).collect::<Vec<_>>(),
            ["task_id", "status", "task_content", "result"]
        );
        assert_eq!(row["task_id"], ColumnValue::from("t1"));
        assert_eq!(row["status"], ColumnValue::Integer(3));
        assert_eq!(row["task_content"], ColumnValue::Blob(vec![1, 2, 3]));
        assert!(row["result"].is_null());
    }

    #[test]
    fn projected_query_needs_columns() {
        let gateway = setup_gateway();
        let (logs, _guard) = capture_logs();
        assert_matches!(
            gateway.query_projected(&TaskQuery::for_instance("i1")),
            Err(TaskStoreError::MalformedQuery(_))
        );
        assert!(logs.has_event(Level::WARN, "projected task query failed"));
    }

    #[test]
    fn fetch_results_in_insertion_order() {
        let gateway = setup_gateway();
        assert!(gateway.batch_save(&[
            TaskRecord {
                result: Some("r-b".to_string()),
                ..task("i1", "b")
            },
            task("i1", "a"),
            TaskRecord {
                result: Some("r-c".to_string()),
                ..task("i1", "c")
            },
            task("i2", "z"),
        ]));

        let results = gateway.fetch_results_by_instance("i1").unwrap();
        let entries: Vec<(&str, Option<&str>)> = results
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
            .collect();
        assert_eq!(
            entries,
            [("b", Some("r-b")), ("a", None), ("c", Some("r-c"))]
        );
        assert!(gateway.fetch_results_by_instance("none").unwrap().is_empty());
    }

    #[test]
    fn initialize_storage_discards_rows() {
        let gateway = setup_gateway();
        assert!(gateway.save(&task("i1", "t1")));
        gateway.initialize_storage().unwrap();
        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 0);
    }

    #[test]
    fn ensure_storage_keeps_rows() {
        let gateway = setup_gateway();
        assert!(gateway.save(&task("i1", "t1")));
        assert!(!gateway.ensure_storage().unwrap());
        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 1);
    }

    #[test]
    fn concurrent_saves_on_file_pool() {
        let dir = tempfile::tempdir().unwrap();
        let settings = StoreSettings {
            db_path: dir.path().join("tasks.db").to_string_lossy().into_owned(),
            ..Default::default()
        };
        let gateway = Arc::new(TaskGateway::open(&settings).unwrap());
        gateway.initialize_storage().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let gateway = Arc::clone(&gateway);
                std::thread::spawn(move || {
                    (0..10).all(|i| gateway.save(&task("i1", &format!("w{worker}-{i}"))))
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(gateway.count(&TaskQuery::for_instance("i1")).unwrap(), 80);
        assert_eq!(gateway.fetch_results_by_instance("i1").unwrap().len(), 80);
    }
}
