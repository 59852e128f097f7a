//! Filter and assignment builders for `task_info` statements.
//!
//! A [`TaskQuery`] is a conjunction of column predicates plus optional
//! projection, ordering and limit. A [`TaskUpdate`] names only the fields a
//! caller wants to change. Both render to a [`Statement`]: SQL text whose
//! values are `?` placeholders, paired with the values to bind.
//!
//! Column names come from the closed [`TaskColumn`] set, never from caller
//! text. Values are always bound, except membership lists longer than
//! [`MAX_BOUND_LIST_ITEMS`], which are written as quoted literals.

use std::fmt::Write;

use rusqlite::types::ToSql;

use crate::errors::{Result, TaskStoreError};
use crate::schema::TABLE;
use crate::types::{ColumnValue, TaskColumn};

/// Longest membership list bound as placeholders before switching to
/// quoted literals.
pub const MAX_BOUND_LIST_ITEMS: usize = 500;

/// Comparison operator for a single-value predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Sort direction for `ORDER BY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Predicate {
    Compare {
        column: TaskColumn,
        op: CompareOp,
        value: ColumnValue,
    },
    In {
        column: TaskColumn,
        values: Vec<ColumnValue>,
    },
}

/// Rendered SQL text with its bound values, in placeholder order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Statement {
    /// SQL text using `?` placeholders.
    pub sql: String,
    /// Values for the placeholders.
    pub params: Vec<ColumnValue>,
}

impl Statement {
    /// Parameters as the trait objects `rusqlite` binds.
    pub fn bind(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|v| v as &dyn ToSql).collect()
    }
}

/// Conjunctive filter over `task_info`, with optional projection, ordering
/// and row limit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskQuery {
    predicates: Vec<Predicate>,
    projection: Vec<TaskColumn>,
    order_by: Vec<(TaskColumn, SortOrder)>,
    limit: Option<u32>,
}

impl TaskQuery {
    /// An empty query. At least one predicate must be added before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task of one instance.
    pub fn for_instance(instance_id: &str) -> Self {
        Self::new().eq(TaskColumn::InstanceId, instance_id)
    }

    /// The single task identified by its composite key.
    pub fn for_task(instance_id: &str, task_id: &str) -> Self {
        Self::for_instance(instance_id).eq(TaskColumn::TaskId, task_id)
    }

    /// Add `column <op> value`.
    #[must_use]
    pub fn compare(
        mut self,
        column: TaskColumn,
        op: CompareOp,
        value: impl Into<ColumnValue>,
    ) -> Self {
        self.predicates.push(Predicate::Compare {
            column,
            op,
            value: value.into(),
        });
        self
    }

    /// Add `column = value`.
    #[must_use]
    pub fn eq(self, column: TaskColumn, value: impl Into<ColumnValue>) -> Self {
        self.compare(column, CompareOp::Eq, value)
    }

    /// Add `column != value`.
    #[must_use]
    pub fn ne(self, column: TaskColumn, value: impl Into<ColumnValue>) -> Self {
        self.compare(column, CompareOp::Ne, value)
    }

    /// Add `column < value`.
    #[must_use]
    pub fn lt(self, column: TaskColumn, value: impl Into<ColumnValue>) -> Self {
        self.compare(column, CompareOp::Lt, value)
    }

    /// Add `column <= value`.
    #[must_use]
    pub fn le(self, column: TaskColumn, value: impl Into<ColumnValue>) -> Self {
        self.compare(column, CompareOp::Le, value)
    }

    /// Add `column > value`.
    #[must_use]
    pub fn gt(self, column: TaskColumn, value: impl Into<ColumnValue>) -> Self {
        self.compare(column, CompareOp::Gt, value)
    }

    /// Add `column >= value`.
    #[must_use]
    pub fn ge(self, column: TaskColumn, value: impl Into<ColumnValue>) -> Self {
        self.compare(column, CompareOp::Ge, value)
    }

    /// Add `column IN (values...)`. An empty list matches nothing.
    #[must_use]
    pub fn is_in<I, V>(mut self, column: TaskColumn, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ColumnValue>,
    {
        self.predicates.push(Predicate::In {
            column,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Columns returned by a projected query, in order.
    #[must_use]
    pub fn select<I: IntoIterator<Item = TaskColumn>>(mut self, columns: I) -> Self {
        self.projection.extend(columns);
        self
    }

    /// Append an ordering key.
    #[must_use]
    pub fn order_by(mut self, column: TaskColumn, order: SortOrder) -> Self {
        self.order_by.push((column, order));
        self
    }

    /// Cap the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Projected columns.
    pub fn projection(&self) -> &[TaskColumn] {
        &self.projection
    }

    /// Render the predicates as a boolean expression (no `WHERE` keyword).
    pub fn filter(&self) -> Result<Statement> {
        if self.predicates.is_empty() {
            return Err(TaskStoreError::malformed("condition has no predicates"));
        }

        let mut clauses = Vec::with_capacity(self.predicates.len());
        let mut params = Vec::new();

        for predicate in &self.predicates {
            match predicate {
                Predicate::Compare { column, op, value } => {
                    check_kind(*column, value)?;
                    clauses.push(format!("{column} {} ?", op.as_sql()));
                    params.push(value.clone());
                }
                Predicate::In { column, values } => {
                    for value in values {
                        check_kind(*column, value)?;
                    }
                    if values.is_empty() {
                        clauses.push("0 = 1".to_string());
                    } else if values.len() <= MAX_BOUND_LIST_ITEMS {
                        let marks = vec!["?"; values.len()].join(", ");
                        clauses.push(format!("{column} IN ({marks})"));
                        params.extend(values.iter().cloned());
                    } else {
                        let literals = values
                            .iter()
                            .map(quote_literal)
                            .collect::<Result<Vec<_>>>()?;
                        clauses.push(format!("{column} IN ({})", literals.join(", ")));
                    }
                }
            }
        }

        Ok(Statement {
            sql: clauses.join(" AND "),
            params,
        })
    }

    fn tail(&self) -> Statement {
        let mut sql = String::new();
        let mut params = Vec::new();
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, order)| match order {
                    SortOrder::Asc => format!("{column} ASC"),
                    SortOrder::Desc => format!("{column} DESC"),
                })
                .collect();
            let _ = write!(sql, " ORDER BY {}", keys.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(ColumnValue::Integer(i64::from(limit)));
        }
        Statement { sql, params }
    }

    /// `SELECT <columns> FROM task_info WHERE ...` with ordering and limit.
    pub fn select_statement(&self, columns: &[TaskColumn]) -> Result<Statement> {
        if columns.is_empty() {
            return Err(TaskStoreError::malformed("projection names no columns"));
        }
        let filter = self.filter()?;
        let tail = self.tail();
        let mut params = filter.params;
        params.extend(tail.params);
        Ok(Statement {
            sql: format!(
                "SELECT {} FROM {TABLE} WHERE {}{}",
                column_list(columns),
                filter.sql,
                tail.sql
            ),
            params,
        })
    }

    /// `SELECT COUNT(*)` over the filter; ordering and limit are ignored.
    pub fn count_statement(&self) -> Result<Statement> {
        let filter = self.filter()?;
        Ok(Statement {
            sql: format!("SELECT COUNT(*) FROM {TABLE} WHERE {}", filter.sql),
            params: filter.params,
        })
    }

    /// `DELETE FROM task_info WHERE ...`.
    pub fn delete_statement(&self) -> Result<Statement> {
        let filter = self.filter()?;
        Ok(Statement {
            sql: format!("DELETE FROM {TABLE} WHERE {}", filter.sql),
            params: filter.params,
        })
    }

    /// `UPDATE task_info SET ... WHERE ...`, stamping `now_millis` as the
    /// modification time unless `update` carries its own.
    pub fn update_statement(&self, update: &TaskUpdate, now_millis: i64) -> Result<Statement> {
        let assignments = update.assignments(now_millis)?;
        let filter = self.filter()?;
        let mut params = assignments.params;
        params.extend(filter.params);
        Ok(Statement {
            sql: format!(
                "UPDATE {TABLE} SET {} WHERE {}",
                assignments.sql, filter.sql
            ),
            params,
        })
    }
}

/// How an update changes `failed_cnt`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailedCntChange {
    /// Raise the count to at least this value. Never lowers it.
    Set(i32),
    /// Add one failure.
    Increment,
}

/// Partial assignment for `task_info` rows. Unset fields are left alone.
///
/// `task_id`, `instance_id` and `created_time` cannot be assigned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New job id.
    pub job_id: Option<String>,
    /// New task name.
    pub task_name: Option<String>,
    /// New payload.
    pub task_content: Option<Vec<u8>>,
    /// New worker address.
    pub address: Option<String>,
    /// New lifecycle state.
    pub status: Option<i32>,
    /// Execution result.
    pub result: Option<String>,
    /// Failure count change.
    pub failed_cnt: Option<FailedCntChange>,
    /// Explicit modification time; defaults to the time of the update.
    pub last_modified_time: Option<i64>,
}

impl TaskUpdate {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Render the `SET` list (no `SET` keyword).
    ///
    /// The modification time is clamped so it never drops below
    /// `created_time` or its previous value.
    pub fn assignments(&self, now_millis: i64) -> Result<Statement> {
        if self.is_empty() {
            return Err(TaskStoreError::malformed("update assigns no fields"));
        }

        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<ColumnValue> = Vec::new();

        let mut assign = |column: TaskColumn, value: ColumnValue| {
            sets.push(format!("{column} = ?"));
            params.push(value);
        };

        if let Some(ref job_id) = self.job_id {
            assign(TaskColumn::JobId, job_id.into());
        }
        if let Some(ref task_name) = self.task_name {
            assign(TaskColumn::TaskName, task_name.into());
        }
        if let Some(ref content) = self.task_content {
            assign(TaskColumn::TaskContent, content.as_slice().into());
        }
        if let Some(ref address) = self.address {
            assign(TaskColumn::Address, address.into());
        }
        if let Some(status) = self.status {
            assign(TaskColumn::Status, status.into());
        }
        if let Some(ref result) = self.result {
            assign(TaskColumn::Result, result.into());
        }

        match self.failed_cnt {
            Some(FailedCntChange::Set(count)) => {
                sets.push("failed_cnt = MAX(COALESCE(failed_cnt, 0), ?)".to_string());
                params.push(count.into());
            }
            Some(FailedCntChange::Increment) => {
                sets.push("failed_cnt = COALESCE(failed_cnt, 0) + 1".to_string());
            }
            None => {}
        }

        sets.push(
            "last_modified_time = MAX(created_time, last_modified_time, ?)".to_string(),
        );
        params.push(self.last_modified_time.unwrap_or(now_millis).into());

        Ok(Statement {
            sql: sets.join(", "),
            params,
        })
    }
}

/// Comma-separated column list.
pub(crate) fn column_list(columns: &[TaskColumn]) -> String {
    columns
        .iter()
        .map(|c| c.as_sql())
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_kind(column: TaskColumn, value: &ColumnValue) -> Result<()> {
    match value.kind() {
        None => Err(TaskStoreError::malformed(format!(
            "NULL cannot be compared on {column}"
        ))),
        Some(kind) if kind != column.kind() => Err(TaskStoreError::malformed(format!(
            "{column} holds {} values, got {kind}",
            column.kind()
        ))),
        Some(_) => Ok(()),
    }
}

/// Render a value as an SQL literal.
///
/// Text is single-quoted with embedded quotes doubled, blobs become
/// `X'..'` hex literals. Text containing NUL is rejected because the
/// statement text cannot carry it.
pub fn quote_literal(value: &ColumnValue) -> Result<String> {
    match value {
        ColumnValue::Null => Ok("NULL".to_string()),
        ColumnValue::Integer(n) => Ok(n.to_string()),
        ColumnValue::Text(s) => {
            if s.contains('\0') {
                return Err(TaskStoreError::malformed(
                    "text literal contains a NUL character",
                ));
            }
            Ok(format!("'{}'", s.replace('\'', "''")))
        }
        ColumnValue::Blob(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 3);
            out.push_str("X'");
            for byte in bytes {
                let _ = write!(out, "{byte:02X}");
            }
            out.push('\'');
            Ok(out)
        }
    }
}
