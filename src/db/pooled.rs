//! Pooled backend: direct PostgreSQL through the managed connection pool.

use crate::config::DatabaseSettings;
use crate::db::client::Database;
use crate::db::executor::QueryExecutor;
use crate::db::pool::PoolManager;
use crate::db::selector::BackendMode;
use crate::db::statement::{StatementBuilder, validate_identifier};
use crate::db::types::Row;
use crate::error::DbResult;
use crate::models::{ExecStatus, RpcArg, SqlParam};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

/// [`Database`] implementation backed by a [`PoolManager`].
#[derive(Debug, Clone)]
pub struct PooledDatabase {
    executor: QueryExecutor,
}

impl PooledDatabase {
    /// Build the backend. The pool itself is created on first use.
    pub fn new(settings: DatabaseSettings) -> Self {
        Self::from_manager(PoolManager::new(settings))
    }

    /// Build the backend on an existing manager.
    pub fn from_manager(manager: Arc<PoolManager>) -> Self {
        Self {
            executor: QueryExecutor::new(manager),
        }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn pool_manager(&self) -> &Arc<PoolManager> {
        self.executor.pool()
    }
}

/// Render `SELECT * FROM name(arg := $1, ...)` with every value bound.
pub fn render_function_call(name: &str, args: &[RpcArg]) -> DbResult<(String, Vec<SqlParam>)> {
    validate_identifier(name)?;

    let mut builder = StatementBuilder::new(format!("SELECT * FROM {}(", name));
    for (i, arg) in args.iter().enumerate() {
        validate_identifier(&arg.name)?;
        if i > 0 {
            builder.push_sql(", ");
        }
        builder.push_sql(&arg.name).push_sql(" := ");
        match &arg.cast {
            Some(cast) => {
                validate_identifier(cast)?;
                builder.push_bind_cast(arg.value.clone(), cast);
            }
            None => {
                builder.push_bind(arg.value.clone());
            }
        }
    }
    builder.push_sql(")");
    Ok(builder.build())
}

#[async_trait]
impl Database for PooledDatabase {
    async fn fetch(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        self.executor.fetch(sql, params).await
    }

    async fn fetchrow(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<Row>> {
        self.executor.fetchrow(sql, params).await
    }

    async fn fetchval(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<JsonValue>> {
        self.executor.fetchval(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<ExecStatus> {
        self.executor.execute(sql, params).await
    }

    async fn executemany(&self, sql: &str, batch: &[Vec<SqlParam>]) -> DbResult<()> {
        self.executor.executemany(sql, batch).await
    }

    async fn call_function(&self, name: &str, args: &[RpcArg]) -> DbResult<Vec<Row>> {
        let (sql, params) = render_function_call(name, args)?;
        debug!(function = name, args = args.len(), "Calling database function");
        self.executor.fetch(&sql, &params).await
    }

    async fn close(&self) {
        self.executor.pool().close().await;
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Pooled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use serde_json::json;

    #[test]
    fn test_render_function_call() {
        let args = vec![
            RpcArg::new("query_embedding", "[0.1,0.2]").with_cast("vector"),
            RpcArg::new("match_count", 5i64).with_cast("int"),
            RpcArg::new("filter", json!({})).with_cast("jsonb"),
            RpcArg::new("source_filter", None::<String>),
        ];
        let (sql, params) = render_function_call("match_crawled_pages", &args).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM match_crawled_pages(query_embedding := $1::vector, \
             match_count := $2::int, filter := $3::jsonb, source_filter := $4)"
        );
        assert_eq!(params.len(), 4);
        assert_eq!(params[1], SqlParam::Int(5));
        assert!(params[3].is_null());
    }

    #[test]
    fn test_render_function_call_without_args() {
        let (sql, params) = render_function_call("public.refresh_stats", &[]).unwrap();
        assert_eq!(sql, "SELECT * FROM public.refresh_stats()");
        assert!(params.is_empty());
    }

    #[test]
    fn test_render_function_call_rejects_bad_identifiers() {
        let err = render_function_call("f(); DROP TABLE sources; --", &[]).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));

        let args = vec![RpcArg::new("x; --", 1i64)];
        assert!(render_function_call("f", &args).is_err());

        let args = vec![RpcArg::new("x", 1i64).with_cast("int; DROP")];
        assert!(render_function_call("f", &args).is_err());
    }

    #[tokio::test]
    async fn test_close_before_first_use() {
        let db = PooledDatabase::new(DatabaseSettings::from_url("postgres://localhost/kb"));
        db.close().await;
        db.close().await;
        assert_eq!(db.mode(), BackendMode::Pooled);
        assert!(!db.pool_manager().is_initialized().await);
    }
}
