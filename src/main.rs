//! knowledge-db - Main entry point.
//!
//! Selects the database backend from the environment, probes it, logs the
//! knowledge-base metrics and shuts the backend down.

use knowledge_db::config::Settings;
use knowledge_db::db::{BackendSelector, Database};
use knowledge_db::error::{DbError, DbResult};
use knowledge_db::services::KnowledgeMetrics;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if settings.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

/// Check the backend answers and report what it holds.
async fn probe(db: Arc<dyn Database>) -> DbResult<()> {
    let version = db.fetchval("SELECT version()", &[]).await?;
    info!(
        mode = %db.mode(),
        version = version
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown"),
        "Database reachable"
    );

    match KnowledgeMetrics::new(db).collect().await {
        Ok(snapshot) => info!(
            average_pages_per_source = snapshot.average_pages_per_source,
            "Knowledge base metrics collected"
        ),
        Err(e) => warn!(error = %e, "Knowledge base metrics unavailable"),
    }
    Ok(())
}

async fn run(settings: &Settings) -> DbResult<()> {
    let selector = BackendSelector::new();
    let db = selector.connect(settings)?;

    let result = tokio::select! {
        result = probe(db.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    db.close().await;
    result
}

fn exit_code(err: &DbError) -> i32 {
    match err {
        DbError::Configuration { .. } => 2,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    // Parse configuration from command line and environment
    let settings = Settings::from_env();

    // Initialize logging
    init_tracing(&settings);

    info!("Starting knowledge-db v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&settings).await {
        error!(error = %e, category = ?e.category(), "Startup probe failed");
        eprintln!("Error: {}", e);
        if let Some(suggestion) = e.suggestion() {
            eprintln!();
            eprintln!("{}", suggestion);
        }
        std::process::exit(exit_code(&e));
    }

    info!("Shutdown complete");
}
