//! Analytics tables: a master table plus one partition per data year.

use super::model::{Column, IndexType, Logged, Table};
use crate::error::TableError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Column of an analytics table together with the expression that fills it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTableColumn {
    #[serde(flatten)]
    pub column: Column,
    /// Expression evaluated against the source relation.
    pub select_expression: String,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub index_type: IndexType,
}

impl AnalyticsTableColumn {
    pub fn new(column: Column, select_expression: impl Into<String>) -> Self {
        Self {
            column,
            select_expression: select_expression.into(),
            indexed: false,
            index_type: IndexType::Btree,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn with_index_type(mut self, index_type: IndexType) -> Self {
        self.indexed = true;
        self.index_type = index_type;
        self
    }

    pub fn name(&self) -> &str {
        &self.column.name
    }
}

/// One slice of an analytics table. `year == None` is the latest-data partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTablePartition {
    master: String,
    pub year: Option<i32>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub checks: Vec<String>,
}

impl AnalyticsTablePartition {
    pub fn name(&self) -> String {
        match self.year {
            Some(year) => format!("{}_{year}", self.master),
            None => format!("{}_latest", self.master),
        }
    }

    pub fn staging_name(&self) -> String {
        Table::to_staging(&self.name())
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    pub fn is_latest(&self) -> bool {
        self.year.is_none()
    }
}

/// Planned analytics table, e.g. `analytics_event_ur1edk5oe2n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTable {
    table_type: String,
    name: String,
    columns: Vec<AnalyticsTableColumn>,
    partitions: Vec<AnalyticsTablePartition>,
}

impl AnalyticsTable {
    pub fn new(
        table_type: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<AnalyticsTableColumn>,
    ) -> Self {
        Self {
            table_type: table_type.into(),
            name: name.into(),
            columns,
            partitions: Vec::new(),
        }
    }

    /// Adds a yearly partition constrained on `year_column`.
    pub fn add_year_partition(&mut self, year: i32, year_column: &str) -> &AnalyticsTablePartition {
        self.partitions.push(AnalyticsTablePartition {
            master: self.name.clone(),
            year: Some(year),
            start: None,
            end: None,
            checks: vec![format!("\"{year_column}\" = {year}")],
        });
        &self.partitions[self.partitions.len() - 1]
    }

    /// Adds the latest-data partition covering `[start, end)`.
    pub fn add_latest_partition(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> &AnalyticsTablePartition {
        self.partitions.push(AnalyticsTablePartition {
            master: self.name.clone(),
            year: None,
            start: Some(start),
            end: Some(end),
            checks: Vec::new(),
        });
        &self.partitions[self.partitions.len() - 1]
    }

    pub fn table_type(&self) -> &str {
        &self.table_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn staging_name(&self) -> String {
        Table::to_staging(&self.name)
    }

    pub fn columns(&self) -> &[AnalyticsTableColumn] {
        &self.columns
    }

    pub fn partitions(&self) -> &[AnalyticsTablePartition] {
        &self.partitions
    }

    pub fn has_partitions(&self) -> bool {
        !self.partitions.is_empty()
    }

    pub fn is_latest_update(&self) -> bool {
        self.partitions.iter().any(AnalyticsTablePartition::is_latest)
    }

    /// Unlogged staging master table.
    pub fn staging_table(&self) -> Result<Table, TableError> {
        let columns = self.columns.iter().map(|c| c.column.clone()).collect();
        Ok(Table::new(self.staging_name(), columns, Vec::new())?.with_logged(Logged::Unlogged))
    }

    /// Unlogged staging table for a partition, inheriting from the staging master.
    pub fn partition_staging_table(
        &self,
        partition: &AnalyticsTablePartition,
    ) -> Result<Table, TableError> {
        let columns = self.columns.iter().map(|c| c.column.clone()).collect();
        Ok(Table::new(partition.staging_name(), columns, Vec::new())?
            .with_checks(partition.checks.clone())
            .with_logged(Logged::Unlogged)
            .with_parent(self.staging_name()))
    }

    /// Standalone staging table for a latest-data partition.
    pub fn latest_staging_table(
        &self,
        partition: &AnalyticsTablePartition,
    ) -> Result<Table, TableError> {
        let columns = self.columns.iter().map(|c| c.column.clone()).collect();
        Ok(Table::new(partition.staging_name(), columns, Vec::new())?.with_logged(Logged::Unlogged))
    }
}
