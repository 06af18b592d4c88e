use super::builder::{unescape_backslashes, SqlBuilder};
use crate::table::{DataType, Table};
use crate::types::Dialect;

/// ClickHouse builder. Tables use the MergeTree engine ordered by the primary key and
/// are swapped with `exchange tables`.
#[derive(Debug, Clone, Default)]
pub struct ClickHouseSqlBuilder;

impl ClickHouseSqlBuilder {
    pub fn new() -> Self {
        Self
    }

    fn column_type(&self, column: &crate::table::Column, is_key: bool) -> String {
        let data_type = self.data_type(column.data_type);
        if column.is_not_null() || is_key {
            data_type.to_string()
        } else {
            format!("Nullable({data_type})")
        }
    }
}

impl SqlBuilder for ClickHouseSqlBuilder {
    fn dialect(&self) -> Dialect {
        Dialect::Clickhouse
    }

    fn data_type(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Smallint => "Int16",
            DataType::Integer => "Int32",
            DataType::Bigint => "Int64",
            DataType::Decimal => "Decimal(21,5)",
            DataType::Float => "Float32",
            DataType::Double => "Float64",
            DataType::Boolean => "Bool",
            DataType::Character11
            | DataType::Character32
            | DataType::Varchar50
            | DataType::Varchar255
            | DataType::Text
            | DataType::Geometry
            | DataType::Jsonb => "String",
            DataType::Date => "Date",
            DataType::Timestamp => "DateTime64(3)",
            DataType::TimestampTz => "DateTime64(3, 'UTC')",
            DataType::GeometryPoint => "Point",
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    /// Backslash is an escape character in ClickHouse string literals.
    fn escape(&self, value: &str) -> String {
        unescape_backslashes(value)
            .replace('\\', "\\\\")
            .replace('\'', "''")
    }

    fn create_table(&self, table: &Table) -> String {
        let key: &[String] = table.primary_key();
        let columns = table
            .columns()
            .iter()
            .map(|c| {
                format!(
                    "{} {}",
                    self.quote(&c.name),
                    self.column_type(c, key.contains(&c.name))
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let order_by = if key.is_empty() {
            "tuple()".to_string()
        } else {
            format!(
                "({})",
                key.iter().map(|k| self.quote(k)).collect::<Vec<_>>().join(", ")
            )
        };
        format!(
            "create table {} ({columns}) engine = MergeTree() order by {order_by}",
            self.quote(table.name())
        )
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!("rename table {} to {}", self.quote(from), self.quote(to))
    }

    /// `exchange tables` is atomic on its own; the old table is left under the staging
    /// name and dropped afterwards.
    fn swap_table(&self, staging: &str, live: &str, live_exists: bool) -> Vec<String> {
        if live_exists {
            vec![
                format!(
                    "exchange tables {} and {}",
                    self.quote(staging),
                    self.quote(live)
                ),
                self.drop_table_if_exists(staging),
            ]
        } else {
            vec![self.rename_table(staging, live)]
        }
    }

    fn table_exists_sql(&self, name: &str) -> String {
        format!(
            "select 1 from system.tables where database = currentDatabase() and name = {}",
            self.single_quote(name)
        )
    }
}
