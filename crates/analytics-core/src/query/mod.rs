//! Composition of event and enrollment analytics queries from clause elements.

mod element;

pub use element::{
    enrollment_table, event_table, ClauseElement, ATTRIBUTE_VALUE_TABLE, RELATIONSHIP_TABLE,
};

use crate::sql::SqlBuilder;

/// Collects rendered select columns and where predicates in insertion order.
pub struct ClauseCollector<'a> {
    builder: &'a dyn SqlBuilder,
    outer_alias: String,
    columns: Vec<String>,
    predicates: Vec<String>,
}

impl<'a> ClauseCollector<'a> {
    pub fn new(builder: &'a dyn SqlBuilder, outer_alias: impl Into<String>) -> Self {
        Self {
            builder,
            outer_alias: outer_alias.into(),
            columns: Vec::new(),
            predicates: Vec::new(),
        }
    }

    /// Adds a plain column of the outer relation.
    pub fn add_column(&mut self, name: &str) -> &mut Self {
        self.columns
            .push(self.builder.quote_alias(&self.outer_alias, name));
        self
    }

    pub fn add_select(&mut self, element: &ClauseElement) -> &mut Self {
        let expr = element.select_expr(&self.outer_alias).render(self.builder);
        self.columns.push(format!(
            "{expr} as {}",
            self.builder.quote(&element.column_name())
        ));
        self
    }

    pub fn add_where(&mut self, element: &ClauseElement) -> &mut Self {
        self.predicates
            .push(element.where_predicate(&self.outer_alias).render(self.builder));
        self
    }

    /// Adds the element both as a column and as a filter.
    pub fn add(&mut self, element: &ClauseElement) -> &mut Self {
        self.add_select(element).add_where(element)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    /// Predicates joined with `and`, or `None` without predicates.
    pub fn where_clause(&self) -> Option<String> {
        if self.predicates.is_empty() {
            None
        } else {
            Some(self.predicates.join(" and "))
        }
    }

    /// Select over `table` aliased as the outer alias.
    pub fn render_query(&self, table: &str) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("select {columns} from {table} as {}", self.outer_alias);
        if let Some(condition) = self.where_clause() {
            sql.push_str(" where ");
            sql.push_str(&condition);
        }
        sql
    }
}
