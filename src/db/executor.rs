//! Query execution engine.
//!
//! Every operation leases one connection from the [`PoolManager`] for the
//! duration of its statement and bounds the statement with the per-command
//! timeout. The lease is a `PoolConnection` guard, so the connection goes back
//! to the pool on success, on error and when the calling future is dropped.
//!
//! Parameters are always bound positionally (`$1`, `$2`, ...) by the driver.

use crate::db::params::bind_all;
use crate::db::pool::PoolManager;
use crate::db::types::{Row, RowToJson, first_value};
use crate::error::{DbError, DbResult};
use crate::models::{ExecStatus, SqlParam};
use serde_json::Value as JsonValue;
use sqlx::Connection;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs parameterized statements against the managed pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    pool: Arc<PoolManager>,
    command_timeout: Duration,
}

impl QueryExecutor {
    /// Create an executor using the pool's configured command timeout.
    pub fn new(pool: Arc<PoolManager>) -> Self {
        let command_timeout = pool.settings().pool.command_timeout;
        Self {
            pool,
            command_timeout,
        }
    }

    /// Override the per-command timeout.
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Return every matching row. No match is an empty vector.
    pub async fn fetch(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        let start = Instant::now();
        debug!(sql = %sql, params = params.len(), "Executing fetch");

        let mut conn = self.pool.acquire().await?;
        let rows = run_with_timeout(
            "fetch",
            self.command_timeout,
            bind_all(sql, params).fetch_all(&mut *conn),
        )
        .await?;

        debug!(
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetch complete"
        );
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    /// Return the first row, or `None` when nothing matches.
    pub async fn fetchrow(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<Row>> {
        debug!(sql = %sql, params = params.len(), "Executing fetchrow");

        let mut conn = self.pool.acquire().await?;
        let row = run_with_timeout(
            "fetchrow",
            self.command_timeout,
            bind_all(sql, params).fetch_optional(&mut *conn),
        )
        .await?;

        Ok(row.as_ref().map(RowToJson::to_json_map))
    }

    /// Return the first column of the first row.
    ///
    /// `None` when no row matches and when the value is SQL NULL.
    pub async fn fetchval(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<JsonValue>> {
        debug!(sql = %sql, params = params.len(), "Executing fetchval");

        let mut conn = self.pool.acquire().await?;
        let row = run_with_timeout(
            "fetchval",
            self.command_timeout,
            bind_all(sql, params).fetch_optional(&mut *conn),
        )
        .await?;

        Ok(row.as_ref().and_then(first_value))
    }

    /// Run a statement that returns no rows and report its status.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<ExecStatus> {
        debug!(sql = %sql, params = params.len(), "Executing statement");

        let mut conn = self.pool.acquire().await?;
        let result = run_with_timeout(
            "execute",
            self.command_timeout,
            bind_all(sql, params).execute(&mut *conn),
        )
        .await?;

        Ok(ExecStatus::for_statement(sql, result.rows_affected()))
    }

    /// Run `sql` once per parameter set, all or nothing.
    ///
    /// The batch runs in a single transaction on one connection. The first
    /// failing item rolls the whole batch back and is reported as
    /// [`DbError::BatchExecution`] with its zero-based index.
    pub async fn executemany(&self, sql: &str, batch: &[Vec<SqlParam>]) -> DbResult<()> {
        let total = batch.len();
        if total == 0 {
            debug!(sql = %sql, "Empty batch, nothing to execute");
            return Ok(());
        }
        debug!(sql = %sql, items = total, "Executing batch");

        let mut conn = self.pool.acquire().await?;
        let mut tx = run_with_timeout("begin", self.command_timeout, conn.begin()).await?;

        for (index, params) in batch.iter().enumerate() {
            let result = run_with_timeout(
                "executemany",
                self.command_timeout,
                bind_all(sql, params).execute(&mut *tx),
            )
            .await;

            if let Err(e) = result {
                warn!(index, total, error = %e, "Batch item failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Batch rollback failed");
                }
                return Err(DbError::batch(index, total, &e));
            }
        }

        run_with_timeout("commit", self.command_timeout, tx.commit()).await?;
        debug!(items = total, "Batch committed");
        Ok(())
    }
}

/// Await a driver future, failing with `Timeout` once `limit` elapses.
async fn run_with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> DbResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result.map_err(DbError::from),
        Err(_) => Err(DbError::timeout_after(operation, limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseSettings, PoolSettings};

    fn unconfigured() -> Arc<PoolManager> {
        PoolManager::new(DatabaseSettings {
            connection_string: None,
            discrete: None,
            pool: PoolSettings::default(),
        })
    }

    #[test]
    fn test_executor_uses_pool_command_timeout() {
        let executor = QueryExecutor::new(unconfigured());
        assert_eq!(executor.command_timeout(), Duration::from_secs(60));

        let executor = executor.with_command_timeout(Duration::from_secs(5));
        assert_eq!(executor.command_timeout(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_timeout_expires() {
        let result: DbResult<()> = run_with_timeout(
            "fetch",
            Duration::from_secs(60),
            std::future::pending::<Result<(), sqlx::Error>>(),
        )
        .await;

        match result {
            Err(DbError::Timeout {
                operation,
                elapsed_secs,
            }) => {
                assert_eq!(operation, "fetch");
                assert_eq!(elapsed_secs, 60);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_with_timeout_maps_driver_error() {
        let result: DbResult<()> = run_with_timeout("execute", Duration::from_secs(1), async {
            Err(sqlx::Error::PoolClosed)
        })
        .await;
        assert!(matches!(result, Err(DbError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_operations_report_missing_configuration() {
        let executor = QueryExecutor::new(unconfigured());

        let err = executor.fetch("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));

        let err = executor.execute("DELETE FROM t", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        // Never touches the pool, so no configuration is needed
        let executor = QueryExecutor::new(unconfigured());
        executor
            .executemany("INSERT INTO t VALUES ($1)", &[])
            .await
            .unwrap();
        assert!(!executor.pool().is_initialized().await);
    }
}
