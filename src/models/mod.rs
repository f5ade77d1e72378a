//! Data models shared by both backends.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;

// Re-export commonly used types
pub use query::{ExecStatus, RpcArg, SqlParam};
