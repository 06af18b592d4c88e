//! Decomposition of correlated subqueries into reusable common table expressions.
//!
//! Event and enrollment analytics queries filter on values like "last scheduled date
//! of the enrollment" or "value of tracked entity attribute X". Written inline, each of
//! these is a correlated subquery evaluated once per outer row. [`CteDecomposer`]
//! recognises those subqueries in a `WHERE` clause and replaces them with references to
//! CTEs computed once per entity and joined back on the entity key.
//! [`CteOptimizationPipeline`] applies the decomposition to whole statements.

mod decomposer;
mod pattern;
mod pipeline;
mod visit;

pub use decomposer::CteDecomposer;
pub use pipeline::CteOptimizationPipeline;

use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, Select};

/// One CTE extracted from a `WHERE` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCte {
    pub name: String,
    /// Body of the CTE, without the surrounding `name as (...)`.
    pub sql: String,
    pub join_alias: String,
    /// `(outer column, CTE column)` the CTE is joined on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_columns: Option<(String, String)>,
    /// Columns the CTE exposes once joined.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl GeneratedCte {
    /// `name as (body)`, as it appears in a `WITH` list.
    pub fn definition(&self) -> String {
        format!("{} as ({})", self.name, self.sql)
    }

    /// Left join of this CTE onto the relation aliased `outer_alias`.
    pub fn join_sql(&self, outer_alias: &str) -> Option<String> {
        let (outer, inner) = self.join_columns.as_ref()?;
        Some(format!(
            "left join {} as {} on {outer_alias}.{outer} = {}.{inner}",
            self.name, self.join_alias, self.join_alias
        ))
    }
}

/// Result of decomposing a single select.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecomposedCtes {
    /// CTEs referenced by the transformed `WHERE`, each listed once.
    pub ctes: Vec<GeneratedCte>,
    pub transformed_where: Option<Expr>,
    pub original_select: Option<Select>,
}

impl DecomposedCtes {
    /// Nothing was extracted.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ctes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_sql() {
        let cte = GeneratedCte {
            name: "last_created".to_string(),
            sql: "select 1".to_string(),
            join_alias: "lc".to_string(),
            join_columns: Some(("enrollment".to_string(), "enrollment".to_string())),
            columns: vec!["enrollment".to_string(), "created".to_string()],
        };
        assert_eq!(
            cte.join_sql("subax").unwrap(),
            "left join last_created as lc on subax.enrollment = lc.enrollment"
        );
        assert_eq!(cte.definition(), "last_created as (select 1)");
    }

    #[test]
    fn test_empty() {
        let empty = DecomposedCtes::empty();
        assert!(empty.is_empty());
        assert!(empty.transformed_where.is_none());
        assert!(empty.original_select.is_none());
    }
}
