use super::builder::SqlBuilder;
use crate::table::{DataType, Table};
use crate::types::Dialect;

/// SQLite builder. DDL is transactional, so a swap is a drop and rename in one
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct SqliteSqlBuilder;

impl SqliteSqlBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl SqlBuilder for SqliteSqlBuilder {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn data_type(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Smallint | DataType::Integer | DataType::Bigint | DataType::Boolean => {
                "integer"
            }
            DataType::Decimal => "numeric",
            DataType::Float | DataType::Double => "real",
            DataType::Character11
            | DataType::Character32
            | DataType::Varchar50
            | DataType::Varchar255
            | DataType::Text
            | DataType::Date
            | DataType::Timestamp
            | DataType::TimestampTz
            | DataType::Jsonb => "text",
            DataType::Geometry | DataType::GeometryPoint => "blob",
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn create_table(&self, table: &Table) -> String {
        let mut parts: Vec<String> = table
            .columns()
            .iter()
            .map(|c| {
                // SQLite only knows its built-in collations.
                let mut column = c.clone();
                column.collation = crate::table::Collation::Default;
                self.column_definition(&column)
            })
            .collect();
        if table.has_primary_key() {
            let keys = table
                .primary_key()
                .iter()
                .map(|k| self.quote(k))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("primary key ({keys})"));
        }
        parts.extend(table.checks().iter().map(|c| format!("check ({c})")));
        format!("create table {} ({})", self.quote(table.name()), parts.join(", "))
    }

    fn analyze_table(&self, name: &str) -> Option<String> {
        Some(format!("analyze {}", self.quote(name)))
    }

    fn table_exists_sql(&self, name: &str) -> String {
        format!(
            "select 1 from sqlite_master where type = 'table' and name = {}",
            self.single_quote(name)
        )
    }
}
