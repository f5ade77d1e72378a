//! Backend-agnostic callers of the `Database` interface.

pub mod metrics;

pub use metrics::{KnowledgeMetrics, MetricsSnapshot};
