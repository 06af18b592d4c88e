use super::builder::SqlBuilder;
use crate::table::{DataType, Index, IndexType, Logged, Table};
use crate::types::Dialect;

/// PostgreSQL builder. Analytics tables are unlogged and partitions inherit from the
/// master table.
#[derive(Debug, Clone)]
pub struct PostgreSqlBuilder {
    schema: String,
}

impl Default for PostgreSqlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgreSqlBuilder {
    pub fn new() -> Self {
        Self {
            schema: "public".to_string(),
        }
    }

    pub fn with_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }
}

impl SqlBuilder for PostgreSqlBuilder {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn data_type(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Smallint => "smallint",
            DataType::Integer => "integer",
            DataType::Bigint => "bigint",
            DataType::Decimal => "decimal(21,5)",
            DataType::Float => "real",
            DataType::Double => "double precision",
            DataType::Boolean => "boolean",
            DataType::Character11 => "char(11)",
            DataType::Character32 => "char(32)",
            DataType::Varchar50 => "varchar(50)",
            DataType::Varchar255 => "varchar(255)",
            DataType::Text => "text",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
            DataType::TimestampTz => "timestamptz",
            DataType::Geometry => "geometry",
            DataType::GeometryPoint => "geometry(Point, 4326)",
            DataType::Jsonb => "jsonb",
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn supports_table_inheritance(&self) -> bool {
        true
    }

    fn create_table(&self, table: &Table) -> String {
        let unlogged = if table.logged() == Logged::Unlogged {
            "unlogged "
        } else {
            ""
        };

        let mut parts: Vec<String> = Vec::new();

        // Child partitions take their columns from the parent.
        if table.parent().is_none() {
            parts.extend(table.columns().iter().map(|c| self.column_definition(c)));
            if table.has_primary_key() {
                let keys = table
                    .primary_key()
                    .iter()
                    .map(|k| self.quote(k))
                    .collect::<Vec<_>>()
                    .join(", ");
                parts.push(format!("primary key ({keys})"));
            }
        }
        parts.extend(table.checks().iter().map(|c| format!("check ({c})")));

        let mut sql = format!(
            "create {unlogged}table {} ({})",
            self.quote(table.name()),
            parts.join(", ")
        );
        if let Some(parent) = table.parent() {
            sql.push_str(&format!(" inherits ({})", self.quote(parent)));
        }
        sql
    }

    fn create_index(&self, index: &Index) -> String {
        let method = match index.index_type {
            IndexType::Btree => "btree",
            IndexType::Gist => "gist",
            IndexType::Gin => "gin",
        };
        let columns = index
            .columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "create index {} on {} using {method} ({columns})",
            self.quote(&index.name),
            self.quote(&index.table_name)
        )
    }

    fn analyze_table(&self, name: &str) -> Option<String> {
        Some(format!("analyze {}", self.quote(name)))
    }

    fn drop_table_if_exists_cascade(&self, name: &str) -> String {
        format!("drop table if exists {} cascade", self.quote(name))
    }

    fn table_exists_sql(&self, name: &str) -> String {
        format!(
            "select 1 from information_schema.tables where table_schema = {} and table_name = {}",
            self.single_quote(&self.schema),
            self.single_quote(name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Collation, Column};

    fn table() -> Table {
        Table::new(
            "analytics_staging",
            vec![
                Column::not_null("dx", DataType::Character11),
                Column::new("ou", DataType::Text).with_collation(Collation::C),
                Column::new("value", DataType::Double),
            ],
            vec!["dx".into()],
        )
        .unwrap()
        .with_logged(Logged::Unlogged)
    }

    #[test]
    fn test_create_unlogged_table() {
        let sql = PostgreSqlBuilder::new().create_table(&table());
        assert_eq!(
            sql,
            "create unlogged table \"analytics_staging\" (\"dx\" char(11) not null, \
             \"ou\" text collate \"C\", \"value\" double precision, primary key (\"dx\"))"
        );
    }

    #[test]
    fn test_create_partition_inherits_parent() {
        let partition = Table::new(
            "analytics_2023_staging",
            vec![Column::not_null("year", DataType::Integer)],
            vec![],
        )
        .unwrap()
        .with_checks(vec!["\"year\" = 2023".into()])
        .with_parent("analytics_staging");
        let sql = PostgreSqlBuilder::new().create_table(&partition);
        assert_eq!(
            sql,
            "create table \"analytics_2023_staging\" (check (\"year\" = 2023)) inherits (\"analytics_staging\")"
        );
    }

    #[test]
    fn test_swap_table_drops_then_renames() {
        let statements = PostgreSqlBuilder::new().swap_table("analytics_staging", "analytics", true);
        assert_eq!(
            statements,
            vec![
                "drop table if exists \"analytics\" cascade".to_string(),
                "alter table \"analytics_staging\" rename to \"analytics\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_quote_escapes() {
        let builder = PostgreSqlBuilder::new();
        assert_eq!(builder.single_quote("O'Neil"), "'O''Neil'");
        assert_eq!(builder.single_quote(r"O\'Neil"), "'O''Neil'");
    }

    #[test]
    fn test_cast_double() {
        let builder = PostgreSqlBuilder::new();
        assert_eq!(builder.cast("'3.5'", DataType::Double), "cast('3.5' as double precision)");
    }

    #[test]
    fn test_gist_index() {
        let index = Index::new("analytics_staging", "geometry").with_type(IndexType::Gist);
        let sql = PostgreSqlBuilder::new().create_index(&index);
        assert_eq!(
            sql,
            "create index \"in_geometry_analytics_staging\" on \"analytics_staging\" using gist (\"geometry\")"
        );
    }
}
