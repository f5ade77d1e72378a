//! Knowledge-base metrics.
//!
//! Counts sources, crawled pages and code examples through whichever backend
//! is active.

use crate::db::Database;
use crate::error::DbResult;
use chrono::{DateTime, Utc};
use futures_util::future::join3;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

const SOURCES_COUNT_SQL: &str = "SELECT COUNT(*) FROM sources";
const PAGES_COUNT_SQL: &str = "SELECT COUNT(*) FROM crawled_pages";
const CODE_EXAMPLES_COUNT_SQL: &str = "SELECT COUNT(*) FROM code_examples";

/// Point-in-time counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub sources_count: i64,
    pub pages_count: i64,
    pub code_examples_count: i64,
    /// Rounded to two decimals; 0 when there are no sources.
    pub average_pages_per_source: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct KnowledgeMetrics {
    db: Arc<dyn Database>,
}

impl KnowledgeMetrics {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Collect the counts concurrently.
    ///
    /// Failures counting sources or pages propagate. The code examples table
    /// is optional; a failure there counts as 0.
    pub async fn collect(&self) -> DbResult<MetricsSnapshot> {
        let (sources, pages, code_examples) = join3(
            self.db.fetchval(SOURCES_COUNT_SQL, &[]),
            self.db.fetchval(PAGES_COUNT_SQL, &[]),
            self.db.fetchval(CODE_EXAMPLES_COUNT_SQL, &[]),
        )
        .await;

        let sources_count = count_from(sources?);
        let pages_count = count_from(pages?);
        let code_examples_count = match code_examples {
            Ok(value) => count_from(value),
            Err(e) => {
                warn!(error = %e, "Code examples count unavailable, reporting 0");
                0
            }
        };

        let snapshot = MetricsSnapshot {
            sources_count,
            pages_count,
            code_examples_count,
            average_pages_per_source: average(pages_count, sources_count),
            timestamp: Utc::now(),
        };

        info!(
            sources = snapshot.sources_count,
            pages = snapshot.pages_count,
            code_examples = snapshot.code_examples_count,
            "Database metrics retrieved"
        );
        Ok(snapshot)
    }
}

impl std::fmt::Debug for KnowledgeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeMetrics")
            .field("mode", &self.db.mode())
            .finish()
    }
}

/// Counts come back as numbers from the pooled backend and may be text from
/// the hosted one. Absent counts are 0.
fn count_from(value: Option<JsonValue>) -> i64 {
    match value {
        Some(JsonValue::Number(n)) => n.as_i64().unwrap_or(0),
        Some(JsonValue::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn average(pages: i64, sources: i64) -> f64 {
    if sources <= 0 {
        return 0.0;
    }
    (pages as f64 / sources as f64 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_from() {
        assert_eq!(count_from(Some(json!(12))), 12);
        assert_eq!(count_from(Some(json!("7"))), 7);
        assert_eq!(count_from(None), 0);
        assert_eq!(count_from(Some(json!(true))), 0);
    }

    #[test]
    fn test_average_rounding() {
        assert_eq!(average(10, 3), 3.33);
        assert_eq!(average(2, 3), 0.67);
        assert_eq!(average(5, 0), 0.0);
    }
}
