//! Dialect-independent description of physical tables.

use crate::error::TableError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const STAGING_SUFFIX: &str = "_staging";

/// Logical column data type, rendered per dialect by a [`crate::sql::SqlBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Smallint,
    Integer,
    Bigint,
    Decimal,
    Float,
    Double,
    Boolean,
    #[serde(rename = "character_11")]
    Character11,
    #[serde(rename = "character_32")]
    Character32,
    #[serde(rename = "varchar_50")]
    Varchar50,
    #[serde(rename = "varchar_255")]
    Varchar255,
    Text,
    Date,
    Timestamp,
    #[serde(rename = "timestamptz")]
    TimestampTz,
    Geometry,
    GeometryPoint,
    Jsonb,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Smallint | Self::Integer | Self::Bigint | Self::Decimal | Self::Float | Self::Double
        )
    }

    pub fn is_character(&self) -> bool {
        matches!(
            self,
            Self::Character11 | Self::Character32 | Self::Varchar50 | Self::Varchar255 | Self::Text
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Nullable {
    #[default]
    Null,
    NotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Collation {
    #[default]
    Default,
    C,
}

/// Whether writes to the table are written to the write-ahead log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Logged {
    #[default]
    Logged,
    Unlogged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    #[default]
    Btree,
    Gist,
    Gin,
}

/// A table column. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: Nullable,
    #[serde(default)]
    pub collation: Collation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: Nullable::Null,
            collation: Collation::Default,
            default_value: None,
        }
    }

    pub fn not_null(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            nullable: Nullable::NotNull,
            ..Self::new(name, data_type)
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn is_not_null(&self) -> bool {
        self.nullable == Nullable::NotNull
    }
}

/// A physical table: name, ordered columns and primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    #[serde(default)]
    primary_key: Vec<String>,
    #[serde(default)]
    checks: Vec<String>,
    #[serde(default)]
    logged: Logged,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
}

impl Table {
    /// Creates a validated table: column names are unique and every key column exists.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<Column>,
        primary_key: Vec<String>,
    ) -> Result<Self, TableError> {
        let table = Self {
            name: name.into(),
            columns,
            primary_key,
            checks: Vec::new(),
            logged: Logged::Logged,
            parent: None,
        };
        table.validate()?;
        Ok(table)
    }

    /// Re-checks the invariants; used for tables that arrive through deserialization.
    pub fn validate(&self) -> Result<(), TableError> {
        if self.name.trim().is_empty() {
            return Err(TableError::EmptyName);
        }
        if self.columns.is_empty() {
            return Err(TableError::NoColumns(self.name.clone()));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        if let Some(missing) = self.primary_key.iter().find(|k| !seen.contains(k.as_str())) {
            return Err(TableError::UnknownKeyColumn {
                table: self.name.clone(),
                column: missing.clone(),
            });
        }
        Ok(())
    }

    pub fn with_checks(mut self, checks: Vec<String>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_logged(mut self, logged: Logged) -> Self {
        self.logged = logged;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn checks(&self) -> &[String] {
        &self.checks
    }

    pub fn logged(&self) -> Logged {
        self.logged
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// A copy of this table named (and parented) under staging names.
    pub fn to_staging_table(&self) -> Self {
        Self {
            name: Self::to_staging(&self.name),
            parent: self.parent.as_deref().map(Self::to_staging),
            ..self.clone()
        }
    }

    /// Returns `<name>_staging`.
    pub fn to_staging(name: &str) -> String {
        format!("{name}{STAGING_SUFFIX}")
    }

    /// Strips one `_staging` suffix if present, otherwise returns the name unchanged.
    pub fn from_staging(name: &str) -> String {
        name.strip_suffix(STAGING_SUFFIX).unwrap_or(name).to_string()
    }

    pub fn is_staging(name: &str) -> bool {
        name.ends_with(STAGING_SUFFIX)
    }
}

/// An index over one or more columns of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub table_name: String,
    pub index_type: IndexType,
    pub columns: Vec<String>,
}

impl Index {
    pub fn new(table_name: impl Into<String>, column: impl Into<String>) -> Self {
        let table_name = table_name.into();
        let column = column.into();
        Self {
            name: format!("in_{}_{}", column.to_lowercase(), table_name),
            table_name,
            index_type: IndexType::Btree,
            columns: vec![column],
        }
    }

    pub fn with_type(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    /// Index names are schema-wide, so rebuilt tables need a fresh suffix.
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.name = format!("{}_{suffix}", self.name);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::not_null("id", DataType::Bigint),
            Column::new("value", DataType::Double),
        ]
    }

    #[test]
    fn test_staging_names() {
        assert_eq!(Table::to_staging("analytics"), "analytics_staging");
        assert_eq!(Table::from_staging("analytics_staging"), "analytics");
        assert_eq!(Table::from_staging("analytics"), "analytics");
    }

    #[test]
    fn test_from_staging_strips_only_one_suffix() {
        assert_eq!(
            Table::from_staging("analytics_staging_staging"),
            "analytics_staging"
        );
    }

    #[test]
    fn test_table_rejects_duplicate_columns() {
        let mut cols = columns();
        cols.push(Column::new("id", DataType::Text));
        let err = Table::new("t", cols, vec![]).unwrap_err();
        assert_eq!(
            err,
            TableError::DuplicateColumn {
                table: "t".into(),
                column: "id".into()
            }
        );
    }

    #[test]
    fn test_table_rejects_unknown_key_column() {
        let err = Table::new("t", columns(), vec!["uid".into()]).unwrap_err();
        assert!(matches!(err, TableError::UnknownKeyColumn { .. }));
    }

    #[test]
    fn test_table_rejects_empty_name() {
        assert_eq!(
            Table::new(" ", columns(), vec![]).unwrap_err(),
            TableError::EmptyName
        );
    }

    #[test]
    fn test_to_staging_table_renames_parent() {
        let table = Table::new("analytics_2023", columns(), vec!["id".into()])
            .unwrap()
            .with_parent("analytics");
        let staging = table.to_staging_table();
        assert_eq!(staging.name(), "analytics_2023_staging");
        assert_eq!(staging.parent(), Some("analytics_staging"));
        assert_eq!(staging.columns(), table.columns());
    }

    #[test]
    fn test_numeric_data_types() {
        assert!(DataType::Double.is_numeric());
        assert!(!DataType::Text.is_numeric());
        assert!(DataType::Character11.is_character());
    }

    #[test]
    fn test_index_name() {
        let index = Index::new("analytics_2023_staging", "ou");
        assert_eq!(index.name, "in_ou_analytics_2023_staging");
    }
}
