//! Statement builder for dynamically assembled SQL.
//!
//! Callers that add optional clauses (filters, SET lists, function arguments)
//! push text and parameters in order; the builder hands out the matching
//! `$n` placeholder for each parameter so numbering stays correct no matter
//! which clauses were included.

use crate::error::{DbError, DbResult};
use crate::models::SqlParam;

#[derive(Debug, Clone, Default)]
pub struct StatementBuilder {
    sql: String,
    params: Vec<SqlParam>,
}

impl StatementBuilder {
    /// Start a statement with the given leading text.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append raw statement text. Never pass caller-supplied values here.
    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Register a parameter and return its placeholder (`$n`).
    ///
    /// The returned placeholder may be used several times in the statement.
    pub fn bind(&mut self, param: impl Into<SqlParam>) -> String {
        self.params.push(param.into());
        format!("${}", self.params.len())
    }

    /// Register a parameter and append its placeholder to the statement.
    pub fn push_bind(&mut self, param: impl Into<SqlParam>) -> &mut Self {
        let placeholder = self.bind(param);
        self.sql.push_str(&placeholder);
        self
    }

    /// Register a parameter and append its placeholder with a type cast.
    pub fn push_bind_cast(&mut self, param: impl Into<SqlParam>, type_name: &str) -> &mut Self {
        let placeholder = self.bind(param);
        self.sql.push_str(&placeholder);
        self.sql.push_str("::");
        self.sql.push_str(type_name);
        self
    }

    /// Index the next bound parameter will receive.
    pub fn next_index(&self) -> usize {
        self.params.len() + 1
    }

    /// Finish the statement.
    pub fn build(self) -> (String, Vec<SqlParam>) {
        (self.sql, self.params)
    }
}

/// Check that `name` is a plain or schema-qualified identifier.
///
/// Identifiers (function names, type casts) cannot be bound as parameters, so
/// they are validated before being placed in statement text.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(DbError::invalid_input(format!(
            "'{}' is not a valid identifier",
            name
        )));
    }
    Ok(())
}
