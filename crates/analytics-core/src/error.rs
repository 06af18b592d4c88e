//! Error types for the analytics engine.
//!
//! # Error Handling Strategy
//!
//! Errors are grouped by the taxonomy of the engine:
//!
//! - [`ParseError`]: SQL could not be parsed. Carries position information extracted
//!   from the underlying parser when available.
//! - [`IllegalQueryError`]: user supplied parameters failed semantic validation. Always
//!   carries a stable, machine-readable [`ErrorCode`] and is never retried.
//! - [`BuildError`]: a table build or replication step failed. The live table is left
//!   untouched and the next scheduled run starts from scratch.
//! - [`JobError`]: a full update of the continuous job failed; the watermark was not
//!   advanced so the next run retries the full update.
//! - [`CompositionError`]: CTE decomposition received input it cannot handle. Fatal for
//!   that single query only.

use crate::types::Dialect;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::trace;

/// SQL that could not be parsed.
#[derive(Debug, Clone, Error)]
#[error("Parse error{}{}: {message}", dialect_suffix(.dialect), position_suffix(.position))]
pub struct ParseError {
    /// Parser message without the trailing location.
    pub message: String,
    pub position: Option<Position>,
    /// Dialect the statement was parsed with.
    pub dialect: Option<Dialect>,
}

/// 1-indexed location of a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Splits the `at Line: L, Column: C` suffix sqlparser appends off `message`.
    fn split(message: &str) -> (&str, Option<Self>) {
        static LOCATION: OnceLock<Regex> = OnceLock::new();
        let re = LOCATION.get_or_init(|| {
            Regex::new(r"\s*at Line:\s*(\d+),\s*Column:\s*(\d+)\s*$").expect("Invalid regex pattern")
        });
        let Some(caps) = re.captures(message) else {
            return (message, None);
        };
        let position = caps[1]
            .parse()
            .ok()
            .zip(caps[2].parse().ok())
            .map(|(line, column)| Self { line, column });
        match (position, caps.get(0)) {
            (Some(position), Some(location)) => (&message[..location.start()], Some(position)),
            _ => {
                trace!(error = message, "Unreadable parse error location");
                (message, None)
            }
        }
    }
}

fn dialect_suffix(dialect: &Option<Dialect>) -> String {
    dialect.map(|d| format!(" ({d:?})")).unwrap_or_default()
}

fn position_suffix(position: &Option<Position>) -> String {
    position
        .map(|p| format!(" at line {}, column {}", p.line, p.column))
        .unwrap_or_default()
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            dialect: None,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        let rendered = err.to_string();
        let (message, position) = Position::split(&rendered);
        Self {
            message: message.to_string(),
            position,
            dialect: None,
        }
    }
}

/// Stable error codes for illegal queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// At least one data element must be specified.
    E7180,
    /// At least one organisation unit must be specified.
    E7181,
    /// Start date and end date must be specified, start before end.
    E7182,
    /// Threshold must be a positive number.
    E7183,
    /// Max results must be a positive number.
    E7184,
    /// Max results exceeds the allowed ceiling.
    E7185,
    /// Data start date must be before data end date.
    E7186,
    /// Order is not applicable to the requested algorithm.
    E7187,
    /// Algorithm is not supported in this context.
    E7188,
    /// Identifier is not a valid UID.
    E7189,
    /// Date could not be parsed.
    E7190,
    /// Unknown algorithm or order name.
    E7191,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E7180 => "E7180",
            Self::E7181 => "E7181",
            Self::E7182 => "E7182",
            Self::E7183 => "E7183",
            Self::E7184 => "E7184",
            Self::E7185 => "E7185",
            Self::E7186 => "E7186",
            Self::E7187 => "E7187",
            Self::E7188 => "E7188",
            Self::E7189 => "E7189",
            Self::E7190 => "E7190",
            Self::E7191 => "E7191",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query failed semantic validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct IllegalQueryError {
    pub code: ErrorCode,
    pub message: String,
}

impl IllegalQueryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Invalid table description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("table name must not be empty")]
    EmptyName,
    #[error("table '{table}' has duplicate column '{column}'")]
    DuplicateColumn { table: String, column: String },
    #[error("table '{table}' key column '{column}' does not exist")]
    UnknownKeyColumn { table: String, column: String },
    #[error("table '{0}' has no columns")]
    NoColumns(String),
}

/// Failure reported by a [`crate::executor::SqlExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    /// Statement that failed, if known.
    pub sql: Option<String>,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

/// Failure while building or replicating a table.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("invalid table: {0}")]
    Table(#[from] TableError),
    #[error("a full analytics table update must run before a latest data update")]
    MissingFullUpdate,
    #[error("analytics table update was cancelled")]
    Cancelled,
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Watermark could not be read or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("watermark storage failed: {0}")]
pub struct WatermarkError(pub String);

/// Failure of a full update run of the continuous job. The watermark is unchanged.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("full analytics table update failed: {0}")]
    Build(#[from] BuildError),
    #[error(transparent)]
    Watermark(#[from] WatermarkError),
}

/// Failure while decomposing a statement into CTEs.
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("expected a single query statement, found {0}")]
    UnsupportedStatement(String),
    #[error("malformed predicate: {0}")]
    MalformedPredicate(String),
}
