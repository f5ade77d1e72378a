//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Query execution
//! - The backend-agnostic `Database` interface and its two backends
//! - Backend selection
//! - Row and parameter type mappings

pub mod client;
pub mod executor;
pub mod hosted;
pub(crate) mod params;
pub mod pool;
pub mod pooled;
pub mod selector;
pub mod statement;
pub mod types;

pub use client::Database;
pub use executor::QueryExecutor;
pub use hosted::HostedDatabase;
pub use pool::{PgConnector, PoolConnector, PoolHandle, PoolManager, PoolStats};
pub use pooled::PooledDatabase;
pub use selector::{BackendMode, BackendSelector};
pub use statement::StatementBuilder;
pub use types::Row;
