//! Hosted backend: a Postgres service reached over its REST RPC endpoint.
//!
//! Function calls are posted to `{url}/rest/v1/rpc/{name}` with the arguments
//! as a JSON object. Plain SQL is routed through one server-side function
//! (`exec_sql` by default) that takes `{"query", "params"}` and returns the
//! resulting rows as a JSON array. The REST surface has no transactions, so
//! `executemany` applies items one by one and stops at the first failure.

use crate::config::HostedSettings;
use crate::db::client::Database;
use crate::db::selector::BackendMode;
use crate::db::statement::validate_identifier;
use crate::db::types::Row;
use crate::error::{DbError, DbResult};
use crate::models::{ExecStatus, RpcArg, SqlParam};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};

/// [`Database`] implementation over the hosted service's REST API.
#[derive(Debug, Clone)]
pub struct HostedDatabase {
    client: reqwest::Client,
    settings: HostedSettings,
}

impl HostedDatabase {
    /// Build the HTTP client. No request is sent until the first operation.
    pub fn new(settings: HostedSettings) -> DbResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| DbError::internal(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            project = settings.project_id().unwrap_or("<custom>"),
            sql_function = %settings.sql_function,
            "Hosted backend ready"
        );
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &HostedSettings {
        &self.settings
    }

    fn rpc_url(&self, function: &str) -> String {
        format!(
            "{}/rest/v1/rpc/{}",
            self.settings.url.as_str().trim_end_matches('/'),
            function
        )
    }

    /// POST `body` to a function endpoint and return the decoded response.
    async fn post_rpc(&self, function: &str, body: &JsonValue) -> DbResult<JsonValue> {
        validate_identifier(function)?;

        let response = self
            .client
            .post(self.rpc_url(function))
            .header("apikey", &self.settings.service_key)
            .bearer_auth(&self.settings.service_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DbError::configuration(
                format!("Hosted backend rejected the service key ({})", status),
                "Check SUPABASE_SERVICE_KEY; it must be the service role key",
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DbError::hosted(status.as_u16(), error_message(&text)));
        }

        let bytes = response.bytes().await.map_err(|e| self.request_error(e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonValue::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| DbError::internal(format!("Invalid hosted response: {}", e)))
    }

    fn request_error(&self, err: reqwest::Error) -> DbError {
        if err.is_timeout() {
            return DbError::timeout_after("hosted request", self.settings.request_timeout);
        }
        DbError::from(err)
    }

    /// Run SQL through the configured SQL function.
    async fn run_sql(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        debug!(sql = %sql, params = params.len(), "Routing SQL through hosted function");
        let body = json!({
            "query": sql,
            "params": params.iter().map(SqlParam::to_json).collect::<Vec<_>>(),
        });
        let value = self.post_rpc(&self.settings.sql_function, &body).await?;
        rows_from_response(value, &self.settings.sql_function)
    }
}

/// Turn an RPC response into rows.
///
/// Arrays of objects are rows; a single object is one row; `null` is no rows.
/// A bare scalar (scalar-returning function) becomes one row keyed by the
/// function name, matching `SELECT * FROM f()` on the pooled backend.
pub fn rows_from_response(value: JsonValue, function: &str) -> DbResult<Vec<Row>> {
    match value {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::Object(row) => Ok(row),
                other => Err(DbError::internal(format!(
                    "Expected row objects from '{}', got {}",
                    function, other
                ))),
            })
            .collect(),
        JsonValue::Object(row) => Ok(vec![row]),
        scalar => {
            let mut row = Row::new();
            row.insert(function.to_string(), scalar);
            Ok(vec![row])
        }
    }
}

/// Pull the `message` out of a PostgREST error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(JsonValue::as_str).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl Database for HostedDatabase {
    async fn fetch(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        self.run_sql(sql, params).await
    }

    async fn fetchrow(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<Row>> {
        Ok(self.run_sql(sql, params).await?.into_iter().next())
    }

    async fn fetchval(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<JsonValue>> {
        let row = self.run_sql(sql, params).await?.into_iter().next();
        Ok(row
            .and_then(|r| r.into_iter().next())
            .map(|(_, value)| value)
            .filter(|value| !value.is_null()))
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<ExecStatus> {
        let rows = self.run_sql(sql, params).await?;
        Ok(ExecStatus::for_statement(sql, rows.len() as u64))
    }

    async fn executemany(&self, sql: &str, batch: &[Vec<SqlParam>]) -> DbResult<()> {
        let total = batch.len();
        for (index, params) in batch.iter().enumerate() {
            if let Err(e) = self.run_sql(sql, params).await {
                warn!(
                    index,
                    total,
                    error = %e,
                    "Batch item failed; earlier items remain applied"
                );
                return Err(DbError::batch(index, total, &e));
            }
        }
        Ok(())
    }

    async fn call_function(&self, name: &str, args: &[RpcArg]) -> DbResult<Vec<Row>> {
        debug!(function = name, args = args.len(), "Calling hosted function");
        let body: serde_json::Map<String, JsonValue> = args
            .iter()
            .map(|arg| (arg.name.clone(), arg.value.to_json()))
            .collect();
        let value = self.post_rpc(name, &JsonValue::Object(body)).await?;
        rows_from_response(value, name)
    }

    async fn close(&self) {
        debug!("Hosted backend holds no pooled resources");
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Hosted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_from_array() {
        let rows = rows_from_response(json!([{"id": 1}, {"id": 2}]), "f").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], json!(2));
    }

    #[test]
    fn test_rows_from_null_and_object() {
        assert!(rows_from_response(JsonValue::Null, "f").unwrap().is_empty());
        let rows = rows_from_response(json!({"n": 3}), "f").unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_rows_from_scalar_keyed_by_function() {
        let rows = rows_from_response(json!(42), "count_sources").unwrap();
        assert_eq!(rows[0]["count_sources"], json!(42));
    }

    #[test]
    fn test_rows_from_rejects_non_object_items() {
        let err = rows_from_response(json!([1, 2]), "f").unwrap_err();
        assert!(matches!(err, DbError::Internal { .. }));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"code":"42883","message":"function x() does not exist"}"#),
            "function x() does not exist"
        );
        assert_eq!(error_message(" gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn test_rpc_url_trims_trailing_slash() {
        let settings = HostedSettings::new("https://abc.supabase.co/", "key").unwrap();
        let db = HostedDatabase::new(settings).unwrap();
        assert_eq!(
            db.rpc_url("match_crawled_pages"),
            "https://abc.supabase.co/rest/v1/rpc/match_crawled_pages"
        );
        assert_eq!(db.mode(), BackendMode::Hosted);
    }
}
