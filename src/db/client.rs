//! The backend-agnostic database interface.
//!
//! Callers hold an `Arc<dyn Database>` and never see which backend serves
//! them. Both implementations ([`PooledDatabase`](crate::db::PooledDatabase)
//! and [`HostedDatabase`](crate::db::HostedDatabase)) are selected once at
//! startup by the [`BackendSelector`](crate::db::BackendSelector).

use crate::db::selector::BackendMode;
use crate::db::types::Row;
use crate::error::DbResult;
use crate::models::{ExecStatus, RpcArg, SqlParam};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Uniform query surface over parameterized SQL.
///
/// Statements use positional placeholders (`$1`, `$2`, ...). "No row" is a
/// normal return value (`None` or an empty vector), never an error.
#[async_trait]
pub trait Database: Send + Sync {
    /// Every matching row, in the order the database returned them.
    async fn fetch(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>>;

    /// The first matching row, if any.
    async fn fetchrow(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<Row>>;

    /// First column of the first row. `None` for no row or a NULL value.
    async fn fetchval(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<JsonValue>>;

    /// Run a mutating statement.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<ExecStatus>;

    /// Run `sql` once per parameter set. A failing item is reported as a
    /// single `BatchExecution` error.
    async fn executemany(&self, sql: &str, batch: &[Vec<SqlParam>]) -> DbResult<()>;

    /// Call a database-side function with named arguments and return its rows.
    async fn call_function(&self, name: &str, args: &[RpcArg]) -> DbResult<Vec<Row>>;

    /// Release backend resources. Safe to call more than once.
    async fn close(&self);

    fn mode(&self) -> BackendMode;
}
