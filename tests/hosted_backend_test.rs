//! Integration tests for the hosted backend against a mock REST server.

use knowledge_db::config::HostedSettings;
use knowledge_db::db::{Database, HostedDatabase};
use knowledge_db::error::DbError;
use knowledge_db::models::{RpcArg, SqlParam};
use knowledge_db::search::{MATCH_CRAWLED_PAGES, VectorSearch};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

const KEY: &str = "service-key";

fn backend(server: &MockServer) -> HostedDatabase {
    HostedDatabase::new(HostedSettings::new(&server.uri(), KEY).unwrap()).unwrap()
}

fn exec_sql(body: serde_json::Value) -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/exec_sql"))
        .and(body_json(body))
}

#[tokio::test]
async fn test_call_function_sends_credentials_and_arguments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/match_crawled_pages"))
        .and(header("apikey", KEY))
        .and(header("authorization", "Bearer service-key"))
        .and(body_json(json!({"query_embedding": "[0.5,1]", "match_count": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 10, "similarity": 0.9},
            {"id": 11, "similarity": 0.4}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let db = backend(&server);
    let args = vec![
        RpcArg::new("query_embedding", "[0.5,1]").with_cast("vector"),
        RpcArg::new("match_count", 2i64),
    ];
    let rows = db.call_function("match_crawled_pages", &args).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], json!(10));
}

#[tokio::test]
async fn test_sql_is_routed_through_sql_function() {
    let server = MockServer::start().await;
    exec_sql(json!({
        "query": "SELECT id, title FROM sources WHERE id = $1",
        "params": ["src-1"]
    }))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"id": "src-1", "title": "Rust docs"}
    ])))
    .mount(&server)
    .await;

    let db = backend(&server);
    let params = [SqlParam::from("src-1")];

    let rows = db
        .fetch("SELECT id, title FROM sources WHERE id = $1", &params)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let row = db
        .fetchrow("SELECT id, title FROM sources WHERE id = $1", &params)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["title"], json!("Rust docs"));

    // First column of the first row
    let value = db
        .fetchval("SELECT id, title FROM sources WHERE id = $1", &params)
        .await
        .unwrap();
    assert_eq!(value, Some(json!("src-1")));
}

#[tokio::test]
async fn test_no_rows_is_not_an_error() {
    let server = MockServer::start().await;
    exec_sql(json!({"query": "SELECT * FROM sources WHERE false", "params": []}))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    exec_sql(json!({"query": "SELECT NULL", "params": []}))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"?column?": null}])))
        .mount(&server)
        .await;

    let db = backend(&server);
    assert!(
        db.fetchrow("SELECT * FROM sources WHERE false", &[])
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        db.fetch("SELECT * FROM sources WHERE false", &[])
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(db.fetchval("SELECT NULL", &[]).await.unwrap(), None);
}

#[tokio::test]
async fn test_execute_reports_status() {
    let server = MockServer::start().await;
    exec_sql(json!({
        "query": "UPDATE sources SET title = $1 RETURNING id",
        "params": ["new"]
    }))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
    .mount(&server)
    .await;

    let db = backend(&server);
    let status = db
        .execute(
            "UPDATE sources SET title = $1 RETURNING id",
            &[SqlParam::from("new")],
        )
        .await
        .unwrap();
    assert_eq!(status.to_string(), "UPDATE 2");
}

#[tokio::test]
async fn test_executemany_stops_at_first_failure() {
    let server = MockServer::start().await;
    let sql = "INSERT INTO tags (name) VALUES ($1)";
    exec_sql(json!({"query": sql, "params": ["a"]}))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    exec_sql(json!({"query": sql, "params": ["b"]}))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint"
        })))
        .expect(1)
        .mount(&server)
        .await;
    exec_sql(json!({"query": sql, "params": ["c"]}))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let db = backend(&server);
    let batch = vec![
        vec![SqlParam::from("a")],
        vec![SqlParam::from("b")],
        vec![SqlParam::from("c")],
    ];
    let err = db.executemany(sql, &batch).await.unwrap_err();

    match err {
        DbError::BatchExecution {
            failed_index,
            total,
            message,
        } => {
            assert_eq!(failed_index, 1);
            assert_eq!(total, 3);
            assert!(message.contains("duplicate key"));
        }
        other => panic!("expected batch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_key_is_configuration_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API key"})))
        .mount(&server)
        .await;

    let err = backend(&server).fetch("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }));
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = backend(&server).fetch("SELECT 1", &[]).await.unwrap_err();
    match &err {
        DbError::Hosted { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("expected hosted error, got {:?}", other),
    }
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_unreachable_service_is_connection_error() {
    let settings = HostedSettings::new("http://127.0.0.1:1", KEY).unwrap();
    let db = HostedDatabase::new(settings).unwrap();

    let err = db.fetch("SELECT 1", &[]).await.unwrap_err();
    assert!(
        matches!(err, DbError::Connection { .. }),
        "expected connection error, got {:?}",
        err
    );
}

#[tokio::test]
async fn test_slow_service_reports_configured_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let settings = HostedSettings::new(&server.uri(), KEY)
        .unwrap()
        .with_request_timeout(Duration::from_secs(1));
    let db = HostedDatabase::new(settings).unwrap();

    let err = db.fetch("SELECT 1", &[]).await.unwrap_err();
    match &err {
        DbError::Timeout {
            operation,
            elapsed_secs,
        } => {
            assert_eq!(operation, "hosted request");
            assert_eq!(*elapsed_secs, 1);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_vector_search_over_hosted_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/match_crawled_pages"))
        .and(body_json(json!({
            "query_embedding": "[0.25,0.5]",
            "match_count": 3,
            "filter": {},
            "source_filter": "docs.rs"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 7, "source_id": "docs.rs", "content": "a", "similarity": 0.8},
            {"id": 8, "source_id": "docs.rs", "content": "b", "similarity": 0.02}
        ])))
        .mount(&server)
        .await;

    let search = VectorSearch::new(Arc::new(backend(&server)));
    let filter = json!({"source": "docs.rs"});
    let results = search
        .vector_search(&[0.25, 0.5], 3, Some(&filter), MATCH_CRAWLED_PAGES)
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].row["id"], json!("7"));
    assert_eq!(results[0].similarity, 0.8);
}

#[tokio::test]
async fn test_vector_search_swallows_hosted_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Could not find the function public.match_crawled_pages"
        })))
        .mount(&server)
        .await;

    let search = VectorSearch::new(Arc::new(backend(&server)));
    let results = search
        .vector_search(&[0.1], 3, None, MATCH_CRAWLED_PAGES)
        .await;
    assert!(results.is_empty());
}
