//! Test utilities: an in-memory [`SqlExecutor`] double and fixture loading.

use crate::error::ExecutionError;
use crate::executor::SqlExecutor;
use crate::table::{AnalyticsTableColumn, AnalyticsTableDefinition, Column, DataType};
use crate::types::CancellationToken;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(manifest_dir).join("tests").join("fixtures")
}

/// Load a SQL fixture file by group and name
pub fn load_sql_fixture(group: &str, name: &str) -> String {
    let path = fixtures_dir().join(group).join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to load fixture {path:?}: {e}"))
}

/// Event analytics table over a plain `event` source table.
pub fn event_table_definition() -> AnalyticsTableDefinition {
    AnalyticsTableDefinition {
        table_type: "event".into(),
        name: "analytics_event".into(),
        from_clause: "event ev".into(),
        year_expression: "extract(year from ev.occurreddate)".into(),
        updated_expression: "ev.lastupdated".into(),
        year_column: "year".into(),
        columns: vec![
            AnalyticsTableColumn::new(Column::not_null("event", DataType::Character11), "ev.uid")
                .indexed(),
            AnalyticsTableColumn::new(
                Column::not_null("year", DataType::Integer),
                "extract(year from ev.occurreddate)",
            ),
        ],
        key_columns: vec!["event".into()],
    }
}

#[derive(Debug, Default)]
struct State {
    statements: Vec<String>,
    atomic_batches: Vec<Vec<String>>,
    tables: HashSet<String>,
}

/// Executor that records statements and simulates table existence.
///
/// `create`, `drop` and `rename` statements update the set of known
/// tables. Statements containing a configured failure pattern return an error; an
/// atomic batch containing such a statement has no effect at all.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    state: Mutex<State>,
    fail_patterns: Vec<String>,
    integers: Vec<(String, Vec<i64>)>,
    rows: Vec<(String, u64)>,
    cancellations: Vec<(String, CancellationToken)>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing_tables<I, S>(self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.tables.extend(tables.into_iter().map(Into::into));
        }
        self
    }

    /// Fails every statement containing `pattern`.
    pub fn fail_on(mut self, pattern: impl Into<String>) -> Self {
        self.fail_patterns.push(pattern.into());
        self
    }

    /// Answers integer queries containing `pattern` with `values`.
    pub fn with_integers(mut self, pattern: impl Into<String>, values: Vec<i64>) -> Self {
        self.integers.push((pattern.into(), values));
        self
    }

    /// Reports `rows` affected rows for statements containing `pattern`.
    pub fn with_rows(mut self, pattern: impl Into<String>, rows: u64) -> Self {
        self.rows.push((pattern.into(), rows));
        self
    }

    /// Cancels `token` once a statement containing `pattern` has run.
    pub fn cancel_on(mut self, pattern: impl Into<String>, token: CancellationToken) -> Self {
        self.cancellations.push((pattern.into(), token));
        self
    }

    /// Every statement issued, including those inside atomic batches.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).statements.clone()
    }

    pub fn atomic_batches(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).atomic_batches.clone()
    }

    pub fn tables(&self) -> HashSet<String> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).tables.clone()
    }

    pub fn statements_containing(&self, pattern: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.contains(pattern))
            .collect()
    }

    fn check(&self, sql: &str) -> Result<(), ExecutionError> {
        match self.fail_patterns.iter().find(|p| sql.contains(p.as_str())) {
            Some(pattern) => Err(ExecutionError::new(format!(
                "simulated failure on '{pattern}'"
            ))
            .with_sql(sql)),
            None => Ok(()),
        }
    }
}

fn quoted_names(sql: &str) -> Vec<String> {
    static NAME: OnceLock<Regex> = OnceLock::new();
    let re = NAME.get_or_init(|| Regex::new(r#""((?:[^"]|"")+)""#).expect("Invalid regex pattern"));
    re.captures_iter(sql)
        .map(|c| c[1].replace("\"\"", "\""))
        .collect()
}

fn apply(tables: &mut HashSet<String>, sql: &str) {
    let names = quoted_names(sql);
    let lower = sql.to_lowercase();
    if lower.starts_with("create") && lower.contains(" table ") {
        if let Some(name) = names.first() {
            tables.insert(name.clone());
        }
    } else if lower.starts_with("drop table") {
        if let Some(name) = names.first() {
            tables.remove(name);
        }
    } else if (lower.starts_with("alter table") && lower.contains(" rename to "))
        || lower.starts_with("rename table")
    {
        if let [from, to, ..] = names.as_slice() {
            if tables.remove(from) {
                tables.insert(to.clone());
            }
        }
    }
}

impl SqlExecutor for RecordingExecutor {
    fn execute(&self, sql: &str) -> Result<u64, ExecutionError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.statements.push(sql.to_string());
        self.check(sql)?;
        apply(&mut state.tables, sql);
        for (pattern, token) in &self.cancellations {
            if sql.contains(pattern.as_str()) {
                token.cancel();
            }
        }
        Ok(self
            .rows
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| *rows)
            .unwrap_or(0))
    }

    fn execute_atomic(&self, statements: &[String]) -> Result<(), ExecutionError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.statements.extend(statements.iter().cloned());
        state.atomic_batches.push(statements.to_vec());
        for sql in statements {
            self.check(sql)?;
        }
        for sql in statements {
            apply(&mut state.tables, sql);
        }
        Ok(())
    }

    fn query_integers(&self, sql: &str) -> Result<Vec<i64>, ExecutionError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.statements.push(sql.to_string());
        self.check(sql)?;
        Ok(self
            .integers
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, values)| values.clone())
            .unwrap_or_default())
    }

    fn table_exists(&self, table_name: &str) -> Result<bool, ExecutionError> {
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner).tables.contains(table_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_created_and_renamed_tables() {
        let executor = RecordingExecutor::new();
        executor.execute("create unlogged table \"a_staging\" (\"id\" bigint)").unwrap();
        executor
            .execute_atomic(&[
                "drop table if exists \"a\" cascade".to_string(),
                "alter table \"a_staging\" rename to \"a\"".to_string(),
            ])
            .unwrap();
        assert!(executor.table_exists("a").unwrap());
        assert!(!executor.table_exists("a_staging").unwrap());
    }

    #[test]
    fn test_failed_batch_has_no_effect() {
        let executor = RecordingExecutor::new()
            .with_existing_tables(["a", "a_staging"])
            .fail_on("rename");
        let result = executor.execute_atomic(&[
            "drop table if exists \"a\"".to_string(),
            "alter table \"a_staging\" rename to \"a\"".to_string(),
        ]);
        assert!(result.is_err());
        assert_eq!(executor.tables().len(), 2);
    }
}
