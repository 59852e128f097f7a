//! # tessera-store
//!
//! Local task persistence for a scheduler worker, backed by `SQLite`.
//!
//! - **Gateway**: [`TaskGateway`] exposes save, batch save, batch delete,
//!   filtered query, projected query, filtered update and result lookup
//! - **Conditions**: [`TaskQuery`] and [`TaskUpdate`] render parameterized
//!   filter and assignment SQL over a closed column set
//! - **Codec**: maps [`TaskRecord`] to and from `task_info` rows, plus a
//!   name-keyed decode for projections
//! - **Schema**: fixed `task_info` DDL with a unique `(instance_id, task_id)`
//!   index
//! - **Connection**: `r2d2` pool, one connection per operation

#![deny(unsafe_code)]

pub mod codec;
pub mod condition;
pub mod connection;
pub mod errors;
pub mod gateway;
pub mod schema;
pub mod types;

pub use condition::{CompareOp, FailedCntChange, SortOrder, Statement, TaskQuery, TaskUpdate};
pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use errors::{Result, TaskStoreError};
pub use gateway::TaskGateway;
pub use types::{ColumnKind, ColumnValue, ProjectedRow, TaskColumn, TaskRecord};
