//! Error types for the data-access layer.
//!
//! This module defines all error types using `thiserror`. Callers branch on the
//! variant (or on [`ErrorCategory`]) to tell mis-configuration apart from an
//! outage, and an outage apart from a failing statement. "No row" is never an
//! error: single-row lookups return `Option`.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String, suggestion: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Batch failed at item {failed_index} of {total}: {message}")]
    BatchExecution {
        failed_index: usize,
        total: usize,
        message: String,
    },

    #[error("Hosted backend returned {status}: {message}")]
    Hosted { status: u16, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification used by request handlers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The process is missing required configuration.
    NotConfigured,
    /// The database cannot be reached right now.
    Unavailable,
    /// The caller sent a statement or argument the database rejected.
    BadRequest,
    Internal,
}

impl DbError {
    /// Create a configuration error with guidance for the operator.
    pub fn configuration(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Timeout error for an operation bounded by `limit`.
    pub fn timeout_after(operation: impl Into<String>, limit: Duration) -> Self {
        Self::timeout(operation, u32::try_from(limit.as_secs()).unwrap_or(u32::MAX))
    }

    /// Create a batch execution error for the item at `failed_index` (zero-based).
    pub fn batch(failed_index: usize, total: usize, source: &DbError) -> Self {
        Self::BatchExecution {
            failed_index,
            total,
            message: source.to_string(),
        }
    }

    pub fn hosted(status: u16, message: impl Into<String>) -> Self {
        Self::Hosted {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration { suggestion, .. } => Some(suggestion),
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Classify this error for the caller-facing layer.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::NotConfigured,
            Self::Connection { .. } | Self::Timeout { .. } => ErrorCategory::Unavailable,
            Self::Hosted { status, .. } if *status >= 500 => ErrorCategory::Unavailable,
            Self::Database { .. }
            | Self::BatchExecution { .. }
            | Self::Hosted { .. }
            | Self::InvalidInput { .. } => ErrorCategory::BadRequest,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// True when the database could not be reached, as opposed to a failing statement.
    pub fn is_unavailable(&self) -> bool {
        self.category() == ErrorCategory::Unavailable
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Use fetchrow/fetchval, which return no value instead of failing",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise DB_ACQUIRE_TIMEOUT or reduce concurrent load",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert HTTP client errors from the hosted backend.
impl From<reqwest::Error> for DbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return DbError::connection(
                "Hosted request timed out",
                "Check the hosted service status and network latency",
            );
        }
        if err.is_decode() {
            return DbError::internal(format!("Invalid hosted response: {}", err));
        }
        DbError::connection(
            format!("Hosted request failed: {}", err),
            "Check the hosted service URL and network connectivity",
        )
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
