use super::builder::SqlBuilder;
use super::expr::SqlExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    table: String,
    alias: String,
    on: SqlExpr,
}

/// Fluent builder for `select` statements with lowercase keywords.
///
/// Table names and aliases are internal identifiers and are rendered as given;
/// everything else goes through [`SqlExpr`].
///
/// ```
/// use dhis_analytics_core::sql::{PostgreSqlBuilder, SelectBuilder, SqlExpr};
///
/// let sql = SelectBuilder::new()
///     .column(SqlExpr::qualified("u", "name"))
///     .from("users", "u")
///     .render(&PostgreSqlBuilder::new());
/// assert_eq!(sql, "select u.\"name\" from users as u");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectBuilder {
    ctes: Vec<(String, SelectBuilder)>,
    distinct: bool,
    columns: Vec<(SqlExpr, Option<String>)>,
    from: Option<(String, Option<String>)>,
    joins: Vec<Join>,
    conditions: Vec<SqlExpr>,
    group_by: Vec<SqlExpr>,
    order_by: Vec<(SqlExpr, SortDirection)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, query: SelectBuilder) -> Self {
        self.ctes.push((name.into(), query));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn column(mut self, expr: SqlExpr) -> Self {
        self.columns.push((expr, None));
        self
    }

    pub fn column_as(mut self, expr: SqlExpr, alias: impl Into<String>) -> Self {
        self.columns.push((expr, Some(alias.into())));
        self
    }

    pub fn from(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.from = Some((table.into(), Some(alias.into())));
        self
    }

    pub fn from_table(mut self, table: impl Into<String>) -> Self {
        self.from = Some((table.into(), None));
        self
    }

    pub fn left_join(
        mut self,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: SqlExpr,
    ) -> Self {
        self.joins.push(Join {
            table: table.into(),
            alias: alias.into(),
            on,
        });
        self
    }

    /// Adds a condition; all conditions are combined with `and`.
    pub fn where_and(mut self, condition: SqlExpr) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn group_by(mut self, expr: SqlExpr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn order_by(mut self, expr: SqlExpr, direction: SortDirection) -> Self {
        self.order_by.push((expr, direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn render(&self, builder: &dyn SqlBuilder) -> String {
        let mut sql = String::new();

        if !self.ctes.is_empty() {
            let ctes = self
                .ctes
                .iter()
                .map(|(name, query)| format!("{name} as ({})", query.render(builder)))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("with {ctes} "));
        }

        sql.push_str("select ");
        if self.distinct {
            sql.push_str("distinct ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let columns = self
                .columns
                .iter()
                .map(|(expr, alias)| match alias {
                    Some(alias) => format!("{} as {}", expr.render(builder), builder.quote(alias)),
                    None => expr.render(builder),
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&columns);
        }

        if let Some((table, alias)) = &self.from {
            sql.push_str(&format!(" from {table}"));
            if let Some(alias) = alias {
                sql.push_str(&format!(" as {alias}"));
            }
        }

        for join in &self.joins {
            sql.push_str(&format!(
                " left join {} as {} on {}",
                join.table,
                join.alias,
                join.on.render(builder)
            ));
        }

        if !self.conditions.is_empty() {
            let condition = SqlExpr::And(self.conditions.clone());
            sql.push_str(&format!(" where {}", condition.render(builder)));
        }

        if !self.group_by.is_empty() {
            let group_by = self
                .group_by
                .iter()
                .map(|e| e.render(builder))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" group by {group_by}"));
        }

        if !self.order_by.is_empty() {
            let order_by = self
                .order_by
                .iter()
                .map(|(e, dir)| format!("{} {} nulls last", e.render(builder), dir.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" order by {order_by}"));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" limit {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" offset {offset}"));
        }

        sql
    }
}
