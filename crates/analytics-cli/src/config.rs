//! TOML configuration of the CLI.
//!
//! Every field has a default so an empty file (or no file at all) is a valid
//! configuration. Command-line flags override file values.

use anyhow::{Context, Result};
use dhis_analytics_core::table::{
    AnalyticsTableColumn, AnalyticsTableDefinition, Column, DataType, IndexType,
};
use dhis_analytics_core::{ContinuousJobSettings, Dialect, Table, TableError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "dhis-analytics.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub analytics: AnalyticsConfig,
    pub tables: Vec<TableConfig>,
    pub replicate: Vec<ReplicaConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    /// Schema or database holding the tables that are replicated.
    pub source_catalog: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            source_catalog: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    pub dialect: Dialect,
    pub parallel_jobs: usize,
    pub last_years: Option<u32>,
    /// Hour of day (UTC) at which the continuous job runs a full update.
    pub full_update_hour_of_day: u32,
    pub watermark_file: PathBuf,
    pub skip_table_types: Vec<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            parallel_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            last_years: None,
            full_update_hour_of_day: 0,
            watermark_file: PathBuf::from("analytics-watermark.json"),
            skip_table_types: Vec::new(),
        }
    }
}

impl AnalyticsConfig {
    pub fn job_settings(&self) -> ContinuousJobSettings {
        ContinuousJobSettings {
            full_update_hour_of_day: self.full_update_hour_of_day,
            last_years: self.last_years,
            parallel_jobs: self.parallel_jobs,
            skip_table_types: self.skip_table_types.clone(),
        }
    }
}

/// One `[[tables]]` entry: an analytics table built from a source relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub table_type: String,
    pub name: String,
    pub from_clause: String,
    pub year_expression: String,
    pub updated_expression: String,
    #[serde(default = "default_year_column")]
    pub year_column: String,
    #[serde(default)]
    pub key_columns: Vec<String>,
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Expression evaluated against the source relation.
    pub select: String,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub index_type: IndexType,
}

impl TableConfig {
    pub fn to_definition(&self) -> AnalyticsTableDefinition {
        AnalyticsTableDefinition {
            table_type: self.table_type.clone(),
            name: self.name.clone(),
            from_clause: self.from_clause.clone(),
            year_expression: self.year_expression.clone(),
            updated_expression: self.updated_expression.clone(),
            year_column: self.year_column.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| {
                    let column = AnalyticsTableColumn::new(
                        column(&c.name, c.data_type, c.nullable),
                        &c.select,
                    );
                    if c.indexed {
                        column.with_index_type(c.index_type)
                    } else {
                        column
                    }
                })
                .collect(),
            key_columns: self.key_columns.clone(),
        }
    }
}

/// One `[[replicate]]` entry: a table copied verbatim from the source database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReplicaConfig {
    pub name: String,
    /// Source table, qualified by `database.source_catalog` when set.
    pub source: String,
    pub columns: Vec<ReplicaColumnConfig>,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReplicaColumnConfig {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

impl ReplicaConfig {
    pub fn to_table(&self) -> Result<Table, TableError> {
        Table::new(
            self.name.clone(),
            self.columns
                .iter()
                .map(|c| column(&c.name, c.data_type, c.nullable))
                .collect(),
            self.primary_key.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Loads `path`, or [`DEFAULT_CONFIG_FILE`] when present, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn replica_tables(&self, only: &[String]) -> Result<Vec<(Table, String)>> {
        if let Some(unknown) = only
            .iter()
            .find(|name| !self.replicate.iter().any(|r| &r.name == *name))
        {
            anyhow::bail!("'{unknown}' is not a configured replica table");
        }
        self.replicate
            .iter()
            .filter(|r| only.is_empty() || only.contains(&r.name))
            .map(|r| -> Result<(Table, String)> {
                let table = r
                    .to_table()
                    .with_context(|| format!("Invalid replica table '{}'", r.name))?;
                Ok((table, r.source.clone()))
            })
            .collect()
    }
}

fn column(name: &str, data_type: DataType, nullable: bool) -> Column {
    if nullable {
        Column::new(name, data_type)
    } else {
        Column::not_null(name, data_type)
    }
}

fn default_year_column() -> String {
    "year".to_string()
}

fn default_true() -> bool {
    true
}
