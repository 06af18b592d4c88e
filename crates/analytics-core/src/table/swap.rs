//! Promotion of staging tables into production.
//!
//! A build writes only to `<name>_staging` tables. Promotion drops the live tables and
//! renames the staging tables in a single atomic batch, so readers see either the old
//! tables or the new ones.

use super::model::Table;
use crate::error::ExecutionError;
use crate::executor::SqlExecutor;
use crate::sql::SqlBuilder;
use tracing::{debug, info, warn};

/// A staging table and the live table it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPair {
    pub staging: String,
    pub live: String,
}

impl SwapPair {
    pub fn new(staging: impl Into<String>, live: impl Into<String>) -> Self {
        Self {
            staging: staging.into(),
            live: live.into(),
        }
    }

    /// Pair for a staging table name, deriving the live name.
    pub fn from_staging(staging: impl Into<String>) -> Self {
        let staging = staging.into();
        let live = Table::from_staging(&staging);
        Self { staging, live }
    }
}

pub struct StagingSwap<'a> {
    executor: &'a dyn SqlExecutor,
    builder: &'a dyn SqlBuilder,
}

impl<'a> StagingSwap<'a> {
    pub fn new(executor: &'a dyn SqlExecutor, builder: &'a dyn SqlBuilder) -> Self {
        Self { executor, builder }
    }

    /// Statements that promote every pair, in order.
    pub fn swap_statements(&self, pairs: &[SwapPair]) -> Result<Vec<String>, ExecutionError> {
        let mut statements = Vec::new();
        for pair in pairs {
            let live_exists = self.executor.table_exists(&pair.live)?;
            statements.extend(self.builder.swap_table(&pair.staging, &pair.live, live_exists));
        }
        Ok(statements)
    }

    /// Promotes all pairs in one atomic batch. On failure nothing is renamed and the
    /// staging tables are left for the caller to drop.
    pub fn swap(&self, pairs: &[SwapPair]) -> Result<(), ExecutionError> {
        let statements = self.swap_statements(pairs)?;
        debug!(statements = statements.len(), "Swapping staging tables");
        self.executor.execute_atomic(&statements)?;
        for pair in pairs {
            info!(table = %pair.live, "Swapped staging table into production");
        }
        Ok(())
    }

    /// Drops staging tables, logging failures instead of returning them. Returns the
    /// names that could not be dropped.
    pub fn drop_staging(&self, names: &[String]) -> Vec<String> {
        let mut failed = Vec::new();
        for name in names {
            let sql = self.builder.drop_table_if_exists_cascade(name);
            if let Err(err) = self.executor.execute(&sql) {
                warn!(table = %name, error = %err, "Failed to drop staging table");
                failed.push(name.clone());
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::PostgreSqlBuilder;
    use crate::test_utils::RecordingExecutor;

    #[test]
    fn test_swap_issues_one_atomic_batch() {
        let executor = RecordingExecutor::new().with_existing_tables(["analytics"]);
        let builder = PostgreSqlBuilder::new();
        let swap = StagingSwap::new(&executor, &builder);

        swap.swap(&[
            SwapPair::from_staging("analytics_staging"),
            SwapPair::from_staging("analytics_2023_staging"),
        ])
        .unwrap();

        let batches = executor.atomic_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![
                "drop table if exists \"analytics\" cascade".to_string(),
                "alter table \"analytics_staging\" rename to \"analytics\"".to_string(),
                "drop table if exists \"analytics_2023\" cascade".to_string(),
                "alter table \"analytics_2023_staging\" rename to \"analytics_2023\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_failed_swap_leaves_live_table() {
        let executor = RecordingExecutor::new()
            .with_existing_tables(["analytics"])
            .fail_on("rename to");
        let builder = PostgreSqlBuilder::new();
        let swap = StagingSwap::new(&executor, &builder);

        assert!(swap.swap(&[SwapPair::from_staging("analytics_staging")]).is_err());
        assert!(executor.table_exists("analytics").unwrap());
    }

    #[test]
    fn test_drop_staging_reports_failures() {
        let executor = RecordingExecutor::new().fail_on("\"b_staging\"");
        let builder = PostgreSqlBuilder::new();
        let swap = StagingSwap::new(&executor, &builder);

        let failed = swap.drop_staging(&["a_staging".to_string(), "b_staging".to_string()]);
        assert_eq!(failed, vec!["b_staging".to_string()]);
        assert_eq!(executor.statements().len(), 2);
    }
}
