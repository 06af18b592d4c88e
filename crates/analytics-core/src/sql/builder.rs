use crate::table::{Collation, DataType, Index, Table};
use crate::types::Dialect;

/// Renders the dialect-independent table model and literals into dialect SQL.
///
/// Default methods produce ANSI-flavoured SQL; dialects override what differs.
pub trait SqlBuilder: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Physical type name for a logical data type.
    fn data_type(&self, data_type: DataType) -> &'static str;

    fn supports_transactional_ddl(&self) -> bool;

    /// Whether partitions can inherit from a master table.
    fn supports_table_inheritance(&self) -> bool {
        false
    }

    /// Double-quoted identifier with embedded quotes doubled.
    fn quote(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Identifier qualified by a table alias, e.g. `ax."ou"`.
    fn quote_alias(&self, alias: &str, name: &str) -> String {
        format!("{alias}.{}", self.quote(name))
    }

    fn quote_ax(&self, name: &str) -> String {
        self.quote_alias("ax", name)
    }

    /// Escapes a string for use inside single quotes. Backslash escapes in the input
    /// are resolved first, then single quotes are doubled.
    fn escape(&self, value: &str) -> String {
        unescape_backslashes(value).replace('\'', "''")
    }

    fn single_quote(&self, value: &str) -> String {
        format!("'{}'", self.escape(value))
    }

    fn cast(&self, expr: &str, data_type: DataType) -> String {
        format!("cast({expr} as {})", self.data_type(data_type))
    }

    /// Table name, optionally qualified by a catalog or schema.
    fn qualify_table(&self, catalog: Option<&str>, name: &str) -> String {
        match catalog {
            Some(catalog) => format!("{}.{}", self.quote(catalog), self.quote(name)),
            None => self.quote(name),
        }
    }

    fn create_table(&self, table: &Table) -> String;

    fn create_index(&self, index: &Index) -> String {
        let columns = index
            .columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "create index {} on {} ({columns})",
            self.quote(&index.name),
            self.quote(&index.table_name)
        )
    }

    fn analyze_table(&self, _name: &str) -> Option<String> {
        None
    }

    fn drop_table_if_exists(&self, name: &str) -> String {
        format!("drop table if exists {}", self.quote(name))
    }

    fn drop_table_if_exists_cascade(&self, name: &str) -> String {
        self.drop_table_if_exists(name)
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!("alter table {} rename to {}", self.quote(from), self.quote(to))
    }

    /// Statements replacing `live` with `staging`. Must be issued as one atomic batch.
    fn swap_table(&self, staging: &str, live: &str, _live_exists: bool) -> Vec<String> {
        vec![
            self.drop_table_if_exists_cascade(live),
            self.rename_table(staging, live),
        ]
    }

    /// Query returning a row if the table exists.
    fn table_exists_sql(&self, name: &str) -> String;

    fn insert_into_select(&self, table: &str, columns: &[&str], select: &str) -> String {
        let columns = columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("insert into {} ({columns}) {select}", self.quote(table))
    }

    /// Deletes rows from `live` whose key also occurs in `staging`.
    fn delete_superseded_rows(&self, live: &str, staging: &str, keys: &[String]) -> String {
        let keys = keys
            .iter()
            .map(|k| self.quote(k))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "delete from {} where ({keys}) in (select {keys} from {})",
            self.quote(live),
            self.quote(staging)
        )
    }

    /// Column definition fragment shared by row-store dialects.
    fn column_definition(&self, column: &crate::table::Column) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote(&column.name),
            self.data_type(column.data_type)
        );
        if column.collation == Collation::C && column.data_type.is_character() {
            sql.push_str(" collate \"C\"");
        }
        if column.is_not_null() {
            sql.push_str(" not null");
        }
        if let Some(default) = &column.default_value {
            sql.push_str(&format!(" default {default}"));
        }
        sql
    }
}

/// Resolves backslash escapes: `\x` becomes `x`; a trailing lone backslash is kept.
pub fn unescape_backslashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_backslashes() {
        assert_eq!(unescape_backslashes(r"O\'Neil"), "O'Neil");
        assert_eq!(unescape_backslashes(r"a\\b"), r"a\b");
        assert_eq!(unescape_backslashes(r"trailing\"), r"trailing\");
        assert_eq!(unescape_backslashes("plain"), "plain");
    }
}
