//! Verbatim copies of operational tables in the analytics database.
//!
//! Reference tables that analytics queries join against (tracked entity attribute
//! values, relationships) are mirrored so queries never cross databases. Each table is
//! copied into `<name>_staging` and swapped in atomically, so a failed copy leaves the
//! previous replica in place.

use crate::error::BuildError;
use crate::executor::SqlExecutor;
use crate::sql::SqlBuilder;
use crate::table::{StagingSwap, SwapPair, Table};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationReport {
    pub table: String,
    pub source: String,
    pub rows: u64,
    pub duration_ms: u64,
}

pub struct TableReplicationService {
    executor: Arc<dyn SqlExecutor>,
    builder: Arc<dyn SqlBuilder>,
    source_catalog: Option<String>,
}

impl TableReplicationService {
    pub fn new(executor: Arc<dyn SqlExecutor>, builder: Arc<dyn SqlBuilder>) -> Self {
        Self {
            executor,
            builder,
            source_catalog: None,
        }
    }

    /// Schema or database holding the source tables.
    pub fn with_source_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.source_catalog = Some(catalog.into());
        self
    }

    /// Replaces `table` with the current contents of `source_name`.
    pub fn replicate(&self, table: &Table, source_name: &str) -> Result<ReplicationReport, BuildError> {
        let _span = info_span!("replicate_table", table = %table.name()).entered();
        let started = Instant::now();
        table.validate()?;

        let staging = table.to_staging_table();
        let result = self.copy_and_swap(table, &staging, source_name);
        let rows = match result {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "Table replication failed");
                StagingSwap::new(self.executor.as_ref(), self.builder.as_ref())
                    .drop_staging(&[staging.name().to_string()]);
                return Err(err);
            }
        };

        let report = ReplicationReport {
            table: table.name().to_string(),
            source: source_name.to_string(),
            rows,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(rows = report.rows, duration_ms = report.duration_ms, "Replicated table");
        Ok(report)
    }

    fn copy_and_swap(&self, table: &Table, staging: &Table, source_name: &str) -> Result<u64, BuildError> {
        let builder = self.builder.as_ref();
        self.executor
            .execute(&builder.drop_table_if_exists(staging.name()))?;
        self.executor.execute(&builder.create_table(staging))?;

        let columns: Vec<&str> = table.column_names().collect();
        let select = format!(
            "select {} from {}",
            columns
                .iter()
                .map(|c| builder.quote(c))
                .collect::<Vec<_>>()
                .join(", "),
            builder.qualify_table(self.source_catalog.as_deref(), source_name)
        );
        let rows = self
            .executor
            .execute(&builder.insert_into_select(staging.name(), &columns, &select))?;

        if let Some(analyze) = builder.analyze_table(staging.name()) {
            self.executor.execute(&analyze)?;
        }

        StagingSwap::new(self.executor.as_ref(), builder)
            .swap(&[SwapPair::new(staging.name(), table.name())])?;
        Ok(rows)
    }

    /// Replicates `(table, source)` pairs in order, stopping at the first failure.
    /// Tables replicated before the failure keep their new contents.
    pub fn replicate_all(&self, tables: &[(Table, String)]) -> Result<Vec<ReplicationReport>, BuildError> {
        tables
            .iter()
            .map(|(table, source)| self.replicate(table, source))
            .collect()
    }
}
