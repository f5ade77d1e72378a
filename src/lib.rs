//! Knowledge DB Library
//!
//! Data-access layer for a knowledge/project backend. Business logic talks to
//! one [`Database`](db::Database) interface, served either by a direct
//! PostgreSQL connection pool or by a hosted Postgres service over REST.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod search;
pub mod services;

pub use config::Settings;
pub use db::{BackendMode, BackendSelector, Database};
pub use error::{DbError, DbResult};
