//! Common types shared between the generator, the job and the CLI.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A non-fatal issue encountered while building tables (warning or info).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Severity level
    pub severity: Severity,

    /// Machine-readable issue code
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Optional: table the issue relates to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl Issue {
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.into(),
            message: message.into(),
            table: None,
        }
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code: code.into(),
            message: message.into(),
            table: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Info,
}

/// Issue codes for non-fatal build findings.
pub mod issue_codes {
    pub const NO_DATA_YEARS: &str = "NO_DATA_YEARS";
    pub const TABLE_SKIPPED: &str = "TABLE_SKIPPED";
    pub const NO_LATEST_DATA: &str = "NO_LATEST_DATA";
    pub const CLEANUP_FAILED: &str = "CLEANUP_FAILED";
}

/// Cooperative cancellation flag shared between an operator and a running job.
///
/// Cancellation is observed between tables and partitions, never in the middle of
/// populating one.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_issue_serializes_without_table() {
        let issue = Issue::warning(issue_codes::NO_DATA_YEARS, "no data");
        let json = serde_json::to_string(&issue).unwrap();
        assert!(!json.contains("table"));
        assert!(json.contains("\"severity\":\"warning\""));
    }
}
