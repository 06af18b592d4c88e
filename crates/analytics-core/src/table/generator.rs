//! Builds analytics tables off to the side and swaps them into production.
//!
//! A full update rebuilds every partition of every table into staging tables,
//! populating partitions on a bounded worker pool, then promotes each table with one
//! atomic swap. A latest-data update copies rows changed since the last full update
//! into a staging table and merges them into the live table in one atomic batch.
//!
//! Cancellation is checked before each table and each partition. Whatever happens,
//! the live table is either untouched or fully replaced.

use super::analytics::{AnalyticsTable, AnalyticsTablePartition};
use super::manager::{AnalyticsTableManager, AnalyticsTableUpdateParams, BuildContext};
use super::model::{Index, Table};
use super::swap::{StagingSwap, SwapPair};
use crate::error::BuildError;
use crate::executor::SqlExecutor;
use crate::sql::SqlBuilder;
use crate::types::{issue_codes, CancellationToken, Issue};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartitionReport {
    pub name: String,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableReport {
    pub table: String,
    pub table_type: String,
    pub partitions: Vec<PartitionReport>,
}

impl TableReport {
    pub fn rows(&self) -> u64 {
        self.partitions.iter().map(|p| p.rows).sum()
    }
}

/// Outcome of one update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub latest_update: bool,
    pub tables: Vec<TableReport>,
    pub issues: Vec<Issue>,
    pub duration_ms: u64,
}

pub struct AnalyticsTableGenerator {
    managers: Vec<Box<dyn AnalyticsTableManager>>,
    executor: Arc<dyn SqlExecutor>,
    builder: Arc<dyn SqlBuilder>,
}

impl AnalyticsTableGenerator {
    pub fn new(executor: Arc<dyn SqlExecutor>, builder: Arc<dyn SqlBuilder>) -> Self {
        Self {
            managers: Vec::new(),
            executor,
            builder,
        }
    }

    pub fn with_manager(mut self, manager: impl AnalyticsTableManager + 'static) -> Self {
        self.managers.push(Box::new(manager));
        self
    }

    pub fn executor(&self) -> &dyn SqlExecutor {
        self.executor.as_ref()
    }

    pub fn builder(&self) -> &dyn SqlBuilder {
        self.builder.as_ref()
    }

    fn ctx(&self) -> BuildContext<'_> {
        BuildContext {
            executor: self.executor.as_ref(),
            builder: self.builder.as_ref(),
        }
    }

    /// Runs one update. Tables already swapped stay in place if a later table fails.
    pub fn generate(
        &self,
        params: &AnalyticsTableUpdateParams,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport, BuildError> {
        let _span = info_span!("analytics_table_update", latest = params.latest_update).entered();
        let started = Instant::now();

        if params.latest_update && params.last_full_update.is_none() {
            return Err(BuildError::MissingFullUpdate);
        }

        let mut report = GenerationReport {
            latest_update: params.latest_update,
            ..Default::default()
        };

        for manager in &self.managers {
            if params.is_skipped(manager.table_type()) {
                info!(table_type = manager.table_type(), "Skipping table type");
                report.issues.push(Issue::info(
                    issue_codes::TABLE_SKIPPED,
                    format!("Table type '{}' skipped", manager.table_type()),
                ));
                continue;
            }
            check_cancelled(cancel)?;

            for table in manager.analytics_tables(params, self.ctx())? {
                check_cancelled(cancel)?;

                if !table.has_partitions() {
                    warn!(table = table.name(), "No data years found, table not built");
                    report.issues.push(
                        Issue::warning(issue_codes::NO_DATA_YEARS, "No data years found")
                            .with_table(table.name()),
                    );
                    continue;
                }

                let table_report = if params.latest_update {
                    self.apply_latest(manager.as_ref(), params, &table, cancel, &mut report.issues)?
                } else {
                    self.build_full(manager.as_ref(), params, &table, cancel, &mut report.issues)?
                };
                if let Some(table_report) = table_report {
                    report.tables.push(table_report);
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            tables = report.tables.len(),
            duration_ms = report.duration_ms,
            "Analytics table update done"
        );
        Ok(report)
    }

    fn build_full(
        &self,
        manager: &dyn AnalyticsTableManager,
        params: &AnalyticsTableUpdateParams,
        table: &AnalyticsTable,
        cancel: &CancellationToken,
        issues: &mut Vec<Issue>,
    ) -> Result<Option<TableReport>, BuildError> {
        let _span = info_span!("build_table", table = table.name()).entered();
        let mut created = Vec::new();

        match self.build_full_inner(manager, params, table, cancel, &mut created) {
            Ok(report) => {
                info!(rows = report.rows(), "Table built and swapped");
                Ok(Some(report))
            }
            Err(err) => {
                warn!(error = %err, "Table build failed, dropping staging tables");
                self.cleanup(&created, issues);
                Err(err)
            }
        }
    }

    fn build_full_inner(
        &self,
        manager: &dyn AnalyticsTableManager,
        params: &AnalyticsTableUpdateParams,
        table: &AnalyticsTable,
        cancel: &CancellationToken,
        created: &mut Vec<String>,
    ) -> Result<TableReport, BuildError> {
        let executor = self.executor.as_ref();
        let builder = self.builder.as_ref();
        let inheritance = builder.supports_table_inheritance();

        let staging = table.staging_table()?;
        self.create(&staging, created)?;

        let mut targets: Vec<(&AnalyticsTablePartition, String)> = Vec::new();
        for partition in table.partitions() {
            if inheritance {
                let partition_table = table.partition_staging_table(partition)?;
                self.create(&partition_table, created)?;
                targets.push((partition, partition_table.name().to_string()));
            } else {
                targets.push((partition, staging.name().to_string()));
            }
        }

        let partitions = self.populate(manager, params, table, &targets, cancel)?;

        let mut populated: Vec<&str> = targets.iter().map(|(_, t)| t.as_str()).collect();
        populated.dedup();
        let suffix = format!("{:x}", params.start_time.timestamp());
        for column in table.columns().iter().filter(|c| c.indexed) {
            for target in &populated {
                let index = Index::new(*target, column.name())
                    .with_type(column.index_type)
                    .with_suffix(&suffix);
                executor.execute(&builder.create_index(&index))?;
            }
        }
        for target in &populated {
            if let Some(sql) = builder.analyze_table(target) {
                executor.execute(&sql)?;
            }
        }

        check_cancelled(cancel)?;

        let mut pairs = vec![SwapPair::new(staging.name(), table.name())];
        if inheritance {
            pairs.extend(
                table
                    .partitions()
                    .iter()
                    .map(|p| SwapPair::new(p.staging_name(), p.name())),
            );
        }
        StagingSwap::new(executor, builder).swap(&pairs)?;

        Ok(TableReport {
            table: table.name().to_string(),
            table_type: table.table_type().to_string(),
            partitions,
        })
    }

    fn apply_latest(
        &self,
        manager: &dyn AnalyticsTableManager,
        params: &AnalyticsTableUpdateParams,
        table: &AnalyticsTable,
        cancel: &CancellationToken,
        issues: &mut Vec<Issue>,
    ) -> Result<Option<TableReport>, BuildError> {
        let _span = info_span!("apply_latest", table = table.name()).entered();

        if !self.executor.table_exists(table.name())? {
            warn!("Live table missing, latest data update skipped");
            issues.push(
                Issue::warning(
                    issue_codes::TABLE_SKIPPED,
                    "Live table does not exist; a full update is required",
                )
                .with_table(table.name()),
            );
            return Ok(None);
        }

        let mut created = Vec::new();
        match self.apply_latest_inner(manager, params, table, cancel, &mut created) {
            Ok(Some(report)) => Ok(Some(report)),
            Ok(None) => {
                info!("No data changed since last full update");
                issues.push(
                    Issue::info(issue_codes::NO_LATEST_DATA, "No data changed since last full update")
                        .with_table(table.name()),
                );
                self.cleanup(&created, issues);
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "Latest data update failed, dropping staging table");
                self.cleanup(&created, issues);
                Err(err)
            }
        }
    }

    fn apply_latest_inner(
        &self,
        manager: &dyn AnalyticsTableManager,
        params: &AnalyticsTableUpdateParams,
        table: &AnalyticsTable,
        cancel: &CancellationToken,
        created: &mut Vec<String>,
    ) -> Result<Option<TableReport>, BuildError> {
        let builder = self.builder.as_ref();
        let Some(partition) = table.partitions().iter().find(|p| p.is_latest()) else {
            return Ok(None);
        };

        let staging = table.latest_staging_table(partition)?;
        self.create(&staging, created)?;

        let targets = vec![(partition, staging.name().to_string())];
        let partitions = self.populate(manager, params, table, &targets, cancel)?;
        if partitions.iter().all(|p| p.rows == 0) {
            return Ok(None);
        }

        check_cancelled(cancel)?;

        let columns: Vec<&str> = table.columns().iter().map(|c| c.name()).collect();
        let select = format!(
            "select {} from {}",
            columns
                .iter()
                .map(|c| builder.quote(c))
                .collect::<Vec<_>>()
                .join(", "),
            builder.quote(staging.name())
        );

        let mut batch = Vec::new();
        let keys = manager.latest_key_columns();
        if !keys.is_empty() {
            batch.push(builder.delete_superseded_rows(table.name(), staging.name(), &keys));
        }
        batch.push(builder.insert_into_select(table.name(), &columns, &select));
        batch.push(builder.drop_table_if_exists(staging.name()));
        self.executor.execute_atomic(&batch)?;
        created.clear();

        info!(rows = partitions.iter().map(|p| p.rows).sum::<u64>(), "Merged latest data");
        Ok(Some(TableReport {
            table: table.name().to_string(),
            table_type: table.table_type().to_string(),
            partitions,
        }))
    }

    /// Drops leftovers from an earlier run, then creates the table.
    fn create(&self, table: &Table, created: &mut Vec<String>) -> Result<(), BuildError> {
        let executor = self.executor.as_ref();
        let builder = self.builder.as_ref();
        executor.execute(&builder.drop_table_if_exists_cascade(table.name()))?;
        executor.execute(&builder.create_table(table))?;
        created.push(table.name().to_string());
        debug!(table = table.name(), "Created staging table");
        Ok(())
    }

    fn populate(
        &self,
        manager: &dyn AnalyticsTableManager,
        params: &AnalyticsTableUpdateParams,
        table: &AnalyticsTable,
        targets: &[(&AnalyticsTablePartition, String)],
        cancel: &CancellationToken,
    ) -> Result<Vec<PartitionReport>, BuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(params.parallel_jobs.max(1))
            .thread_name(|i| format!("analytics-populate-{i}"))
            .build()
            .map_err(|e| BuildError::WorkerPool(e.to_string()))?;
        let ctx = self.ctx();

        pool.install(|| {
            targets
                .par_iter()
                .map(|(partition, target)| -> Result<PartitionReport, BuildError> {
                    check_cancelled(cancel)?;
                    let name = partition.name();
                    let rows = manager.populate_partition(params, table, partition, target, ctx)?;
                    info!(partition = %name, rows, "Populated partition");
                    Ok(PartitionReport { name, rows })
                })
                .collect::<Result<Vec<_>, BuildError>>()
        })
    }

    fn cleanup(&self, created: &[String], issues: &mut Vec<Issue>) {
        let names: Vec<String> = created.iter().rev().cloned().collect();
        let failed = StagingSwap::new(self.executor.as_ref(), self.builder.as_ref())
            .drop_staging(&names);
        for name in failed {
            issues.push(
                Issue::warning(issue_codes::CLEANUP_FAILED, "Failed to drop staging table")
                    .with_table(name),
            );
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), BuildError> {
    if cancel.is_cancelled() {
        Err(BuildError::Cancelled)
    } else {
        Ok(())
    }
}
