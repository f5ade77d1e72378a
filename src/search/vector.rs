//! Vector similarity search through a database-side matching function.
//!
//! The matching function ranks candidates itself; this caller only binds the
//! arguments, drops candidates below the similarity threshold and normalizes
//! identifier columns. Search is best-effort: failures are logged and yield
//! an empty result instead of an error.

use crate::db::Database;
use crate::db::types::{Row, normalize_identifiers};
use crate::error::DbResult;
use crate::models::RpcArg;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, error};

/// Minimum similarity a candidate needs to be returned.
pub const SIMILARITY_THRESHOLD: f64 = 0.05;

/// Matching function over crawled page chunks.
pub const MATCH_CRAWLED_PAGES: &str = "match_crawled_pages";
/// Matching function over extracted code examples.
pub const MATCH_CODE_EXAMPLES: &str = "match_code_examples";

const IDENTIFIER_COLUMNS: &[&str] = &["id", "source_id"];

/// A candidate that passed the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    pub similarity: f64,
    /// Remaining columns, without `similarity`.
    #[serde(flatten)]
    pub row: Row,
}

/// Best-effort vector search over any backend.
#[derive(Clone)]
pub struct VectorSearch {
    db: Arc<dyn Database>,
    threshold: f64,
}

impl VectorSearch {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            threshold: SIMILARITY_THRESHOLD,
        }
    }

    /// Override the similarity threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Search `function` for the `match_count` rows closest to `embedding`.
    ///
    /// `filter` is a JSON object. A `source` key restricts the search to one
    /// source; any other object is passed to the function as its metadata
    /// filter. Rows come back in the order the function produced them.
    ///
    /// Never fails: errors are logged and produce an empty vector.
    pub async fn vector_search(
        &self,
        embedding: &[f32],
        match_count: u32,
        filter: Option<&JsonValue>,
        function: &str,
    ) -> Vec<ScoredRow> {
        match self.try_search(embedding, match_count, filter, function).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(
                    function,
                    match_count,
                    mode = %self.db.mode(),
                    error = %e,
                    "Vector search failed"
                );
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        embedding: &[f32],
        match_count: u32,
        filter: Option<&JsonValue>,
        function: &str,
    ) -> DbResult<Vec<ScoredRow>> {
        let args = search_args(embedding, match_count, filter);
        let candidates = self.db.call_function(function, &args).await?;
        let total = candidates.len();

        let results = filter_by_similarity(candidates, self.threshold);
        debug!(
            function,
            match_count,
            results_found = results.len(),
            results_filtered = total - results.len(),
            "Vector search complete"
        );
        Ok(results)
    }
}

impl std::fmt::Debug for VectorSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorSearch")
            .field("mode", &self.db.mode())
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Render an embedding as a pgvector literal: `[0.1,0.2,0.3]`.
pub fn format_vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Arguments for a matching function call, all bound as parameters.
pub fn search_args(embedding: &[f32], match_count: u32, filter: Option<&JsonValue>) -> Vec<RpcArg> {
    let (filter_json, source_filter) = split_filter(filter);
    vec![
        RpcArg::new("query_embedding", format_vector_literal(embedding)).with_cast("vector"),
        RpcArg::new("match_count", i64::from(match_count)).with_cast("int"),
        RpcArg::new("filter", filter_json).with_cast("jsonb"),
        RpcArg::new("source_filter", source_filter),
    ]
}

/// Split a caller filter into (metadata filter, single-source filter).
fn split_filter(filter: Option<&JsonValue>) -> (JsonValue, Option<String>) {
    match filter {
        Some(JsonValue::Object(map)) if map.contains_key("source") => {
            let source = match &map["source"] {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Null => None,
                other => Some(other.to_string()),
            };
            (JsonValue::Object(Map::new()), source)
        }
        Some(value) if !value.is_null() => (value.clone(), None),
        _ => (JsonValue::Object(Map::new()), None),
    }
}

/// Keep candidates scoring at least `threshold`, preserving their order.
///
/// A missing or unreadable score counts as 0.0.
pub fn filter_by_similarity(rows: Vec<Row>, threshold: f64) -> Vec<ScoredRow> {
    rows.into_iter()
        .filter_map(|mut row| {
            let similarity = row
                .shift_remove("similarity")
                .as_ref()
                .and_then(score_of)
                .unwrap_or(0.0);
            if similarity < threshold {
                return None;
            }
            normalize_identifiers(&mut row, IDENTIFIER_COLUMNS);
            Some(ScoredRow { similarity, row })
        })
        .collect()
}

/// Scores arrive as numbers, or as text for NUMERIC columns.
fn score_of(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}
