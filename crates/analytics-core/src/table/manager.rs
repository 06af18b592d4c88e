//! Per table type planning and population of analytics tables.

use super::analytics::{AnalyticsTable, AnalyticsTableColumn, AnalyticsTablePartition};
use crate::error::BuildError;
use crate::executor::SqlExecutor;
use crate::sql::{SelectBuilder, SqlBuilder, SqlExpr};
use chrono::{DateTime, Datelike, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parameters of one analytics table update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTableUpdateParams {
    /// Start of this update; upper bound of a latest-data update.
    pub start_time: DateTime<Utc>,
    /// Only rebuild this many most recent years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_years: Option<u32>,
    /// Build only data changed since the last full update.
    #[serde(default)]
    pub latest_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_full_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub skip_table_types: Vec<String>,
    pub parallel_jobs: usize,
}

impl AnalyticsTableUpdateParams {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            last_years: None,
            latest_update: false,
            last_full_update: None,
            skip_table_types: Vec::new(),
            parallel_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// Parameters for a latest-data update covering `[last_full_update, start_time)`.
    pub fn latest(start_time: DateTime<Utc>, last_full_update: Option<DateTime<Utc>>) -> Self {
        Self {
            latest_update: true,
            last_full_update,
            ..Self::new(start_time)
        }
    }

    pub fn with_last_years(mut self, last_years: Option<u32>) -> Self {
        self.last_years = last_years;
        self
    }

    pub fn with_skip_table_types(mut self, skip: Vec<String>) -> Self {
        self.skip_table_types = skip;
        self
    }

    pub fn with_parallel_jobs(mut self, parallel_jobs: usize) -> Self {
        self.parallel_jobs = parallel_jobs.max(1);
        self
    }

    /// First year to rebuild when `last_years` is set.
    pub fn from_year(&self) -> Option<i32> {
        self.last_years
            .map(|years| self.start_time.year() - years.max(1) as i32 + 1)
    }

    pub fn is_skipped(&self, table_type: &str) -> bool {
        self.skip_table_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table_type))
    }
}

/// Database access handed to managers.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub executor: &'a dyn SqlExecutor,
    pub builder: &'a dyn SqlBuilder,
}

/// Plans and fills the analytics tables of one table type.
pub trait AnalyticsTableManager: Send + Sync {
    fn table_type(&self) -> &str;

    /// Tables to build for this update, with their partitions.
    fn analytics_tables(
        &self,
        params: &AnalyticsTableUpdateParams,
        ctx: BuildContext<'_>,
    ) -> Result<Vec<AnalyticsTable>, BuildError>;

    /// Fills one partition, writing into `target`. Returns the number of rows written.
    fn populate_partition(
        &self,
        params: &AnalyticsTableUpdateParams,
        table: &AnalyticsTable,
        partition: &AnalyticsTablePartition,
        target: &str,
        ctx: BuildContext<'_>,
    ) -> Result<u64, BuildError>;

    /// Columns identifying a row, used to replace superseded rows in a latest-data
    /// update.
    fn latest_key_columns(&self) -> Vec<String>;
}

/// Configured analytics table. Expressions are trusted SQL from the deployment
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTableDefinition {
    pub table_type: String,
    pub name: String,
    /// Source relation, e.g. `event ev inner join enrollment en on ...`.
    pub from_clause: String,
    /// Expression yielding the data year of a source row.
    pub year_expression: String,
    /// Expression yielding the last update time of a source row.
    pub updated_expression: String,
    /// Column holding the year in the analytics table.
    #[serde(default = "default_year_column")]
    pub year_column: String,
    pub columns: Vec<AnalyticsTableColumn>,
    #[serde(default)]
    pub key_columns: Vec<String>,
}

fn default_year_column() -> String {
    "year".to_string()
}

/// [`AnalyticsTableManager`] driven by an [`AnalyticsTableDefinition`].
#[derive(Debug, Clone)]
pub struct SqlTableManager {
    definition: AnalyticsTableDefinition,
}

impl SqlTableManager {
    pub fn new(definition: AnalyticsTableDefinition) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &AnalyticsTableDefinition {
        &self.definition
    }

    fn data_years(
        &self,
        params: &AnalyticsTableUpdateParams,
        ctx: BuildContext<'_>,
    ) -> Result<Vec<i32>, BuildError> {
        let year = SqlExpr::raw(&self.definition.year_expression);
        let mut select = SelectBuilder::new()
            .distinct()
            .column(year.clone())
            .from_table(&self.definition.from_clause)
            .where_and(year.clone().is_not_null());
        if let Some(from_year) = params.from_year() {
            select = select.where_and(year.gt_eq(SqlExpr::integer(from_year.into())));
        }
        let sql = select.render(ctx.builder);
        let years = ctx.executor.query_integers(&sql)?;
        let mut years: Vec<i32> = years
            .into_iter()
            .filter_map(|y| i32::try_from(y).ok())
            .collect();
        years.sort_unstable();
        years.dedup();
        Ok(years)
    }
}

impl AnalyticsTableManager for SqlTableManager {
    fn table_type(&self) -> &str {
        &self.definition.table_type
    }

    fn analytics_tables(
        &self,
        params: &AnalyticsTableUpdateParams,
        ctx: BuildContext<'_>,
    ) -> Result<Vec<AnalyticsTable>, BuildError> {
        let mut table = AnalyticsTable::new(
            &self.definition.table_type,
            &self.definition.name,
            self.definition.columns.clone(),
        );

        if params.latest_update {
            let start = params
                .last_full_update
                .ok_or(BuildError::MissingFullUpdate)?;
            table.add_latest_partition(start, params.start_time);
        } else {
            let years = self.data_years(params, ctx)?;
            debug!(table = %self.definition.name, ?years, "Resolved data years");
            for year in years {
                table.add_year_partition(year, &self.definition.year_column);
            }
        }
        Ok(vec![table])
    }

    fn populate_partition(
        &self,
        _params: &AnalyticsTableUpdateParams,
        table: &AnalyticsTable,
        partition: &AnalyticsTablePartition,
        target: &str,
        ctx: BuildContext<'_>,
    ) -> Result<u64, BuildError> {
        let mut select = SelectBuilder::new().from_table(&self.definition.from_clause);
        for column in table.columns() {
            select = select.column(SqlExpr::raw(&column.select_expression));
        }

        select = match (partition.year, partition.start, partition.end) {
            (Some(year), _, _) => select.where_and(
                SqlExpr::raw(&self.definition.year_expression).eq(SqlExpr::integer(year.into())),
            ),
            (None, Some(start), Some(end)) => {
                let updated = SqlExpr::raw(&self.definition.updated_expression);
                select
                    .where_and(
                        updated
                            .clone()
                            .gt_eq(SqlExpr::text(start.format(TIMESTAMP_FORMAT).to_string())),
                    )
                    .where_and(updated.lt(SqlExpr::text(end.format(TIMESTAMP_FORMAT).to_string())))
            }
            (None, _, _) => select,
        };

        let columns: Vec<&str> = table.columns().iter().map(|c| c.name()).collect();
        let sql = ctx
            .builder
            .insert_into_select(target, &columns, &select.render(ctx.builder));
        Ok(ctx.executor.execute(&sql)?)
    }

    fn latest_key_columns(&self) -> Vec<String> {
        self.definition.key_columns.clone()
    }
}
