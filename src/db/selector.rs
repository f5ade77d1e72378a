//! Backend selection.
//!
//! The active backend is decided on first use from which variables are
//! present and then fixed for the life of the selector; switching backends
//! requires a restart.

use crate::config::{BackendChoice, CONFIGURATION_GUIDANCE, Settings};
use crate::db::client::Database;
use crate::db::hosted::HostedDatabase;
use crate::db::pooled::PooledDatabase;
use crate::error::{DbError, DbResult};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Which backend serves database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Direct PostgreSQL connection pool
    Pooled,
    /// Hosted service over REST
    Hosted,
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pooled => write!(f, "pooled"),
            Self::Hosted => write!(f, "hosted"),
        }
    }
}

/// Resolves the backend once and remembers it.
#[derive(Debug, Default)]
pub struct BackendSelector {
    mode: OnceLock<BackendMode>,
}

impl BackendSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the backend mode.
    ///
    /// The first successful resolution is memoized; later calls return it
    /// without looking at `settings` again. A failed resolution is not
    /// memoized.
    pub fn resolve_mode(&self, settings: &Settings) -> DbResult<BackendMode> {
        if let Some(mode) = self.mode.get() {
            return Ok(*mode);
        }

        let detected = detect_mode(settings)?;
        if self.mode.set(detected).is_ok() {
            info!(mode = %detected, "Database backend selected");
        }
        Ok(*self.mode.get().unwrap_or(&detected))
    }

    /// The memoized mode, if resolved.
    pub fn mode(&self) -> Option<BackendMode> {
        self.mode.get().copied()
    }

    /// Resolve the mode and build the matching backend.
    pub fn connect(&self, settings: &Settings) -> DbResult<Arc<dyn Database>> {
        match self.resolve_mode(settings)? {
            BackendMode::Pooled => Ok(Arc::new(PooledDatabase::new(settings.database()?))),
            BackendMode::Hosted => Ok(Arc::new(HostedDatabase::new(settings.hosted()?)?)),
        }
    }
}

/// Pick a backend from `settings` without memoizing.
///
/// An explicit choice wins. Otherwise the pooled variables are checked
/// first, then the hosted pair.
pub fn detect_mode(settings: &Settings) -> DbResult<BackendMode> {
    match settings.backend {
        Some(BackendChoice::Pooled) if settings.has_pooled() => Ok(BackendMode::Pooled),
        Some(BackendChoice::Pooled) => Err(DbError::configuration(
            "DATABASE_BACKEND=pooled but neither DATABASE_URL nor POSTGRES_HOST is set",
            CONFIGURATION_GUIDANCE,
        )),
        Some(BackendChoice::Hosted) if settings.has_hosted() => Ok(BackendMode::Hosted),
        Some(BackendChoice::Hosted) => Err(DbError::configuration(
            "DATABASE_BACKEND=hosted but SUPABASE_URL and SUPABASE_SERVICE_KEY are not both set",
            CONFIGURATION_GUIDANCE,
        )),
        None if settings.has_pooled() => Ok(BackendMode::Pooled),
        None if settings.has_hosted() => Ok(BackendMode::Hosted),
        None => Err(DbError::configuration(
            "No database backend is configured",
            CONFIGURATION_GUIDANCE,
        )),
    }
}
