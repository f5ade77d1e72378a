//! Query-related data models.
//!
//! This module defines parameter values, statement status descriptors and the
//! named arguments used to call database-side functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A parameter value for parameterized statements.
///
/// Parameters are always bound by the driver at positional placeholders
/// (`$1`, `$2`, ...), never interpolated into statement text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Text(String),
    /// UUID value
    Uuid(Uuid),
    /// Timestamp with time zone
    Timestamp(DateTime<Utc>),
    /// JSON/JSONB value
    Json(JsonValue),
    /// Array of strings (text[])
    TextArray(Vec<String>),
}

impl SqlParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::Json(_) => "json",
            Self::TextArray(_) => "text[]",
        }
    }

    /// JSON representation, used when parameters travel over the hosted REST API.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Int(v) => JsonValue::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Text(v) => JsonValue::String(v.clone()),
            Self::Uuid(v) => JsonValue::String(v.to_string()),
            Self::Timestamp(v) => JsonValue::String(v.to_rfc3339()),
            Self::Json(v) => v.clone(),
            Self::TextArray(v) => JsonValue::from(v.clone()),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SqlParam {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for SqlParam {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<JsonValue> for SqlParam {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Status descriptor returned by `execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStatus {
    /// Leading keyword of the statement, upper-cased (e.g. "INSERT").
    pub command: String,
    pub rows_affected: u64,
}

impl ExecStatus {
    /// Build a status for `sql`, taking the command from its first keyword.
    pub fn for_statement(sql: &str, rows_affected: u64) -> Self {
        let command = sql
            .split_whitespace()
            .next()
            .map(|word| {
                word.trim_start_matches('(')
                    .trim_end_matches(';')
                    .to_ascii_uppercase()
            })
            .unwrap_or_default();
        Self {
            command,
            rows_affected,
        }
    }
}

impl std::fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.command, self.rows_affected)
    }
}

/// A named argument for a database-side function call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcArg {
    pub name: String,
    pub value: SqlParam,
    /// Type cast applied to the placeholder on the pooled backend (e.g. "vector").
    pub cast: Option<String>,
}

impl RpcArg {
    pub fn new(name: impl Into<String>, value: impl Into<SqlParam>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            cast: None,
        }
    }

    /// Cast the bound placeholder to `type_name` (pooled backend only; the
    /// hosted backend lets the server coerce JSON arguments).
    pub fn with_cast(mut self, type_name: impl Into<String>) -> Self {
        self.cast = Some(type_name.into());
        self
    }
}
