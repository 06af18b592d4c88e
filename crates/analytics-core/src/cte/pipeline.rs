use super::decomposer::CteDecomposer;
use super::visit::visit_expr_mut;
use super::GeneratedCte;
use crate::error::CompositionError;
use crate::parser::parse_sql_with_dialect;
use crate::types::Dialect;
use sqlparser::ast::{
    Expr, GroupByExpr, Ident, Join, OrderByKind, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, With,
};
use tracing::{debug, info_span};

/// Rewrites whole statements, moving correlated subqueries into shared CTEs.
#[derive(Debug, Clone, Copy)]
pub struct CteOptimizationPipeline {
    dialect: Dialect,
}

impl Default for CteOptimizationPipeline {
    fn default() -> Self {
        Self::new(Dialect::Postgres)
    }
}

impl CteOptimizationPipeline {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Optimizes a single query statement and renders it back to SQL.
    pub fn optimize(&self, sql: &str) -> Result<String, CompositionError> {
        let _span = info_span!("optimize_query").entered();
        let mut statements = parse_sql_with_dialect(sql, self.dialect)?;
        if statements.len() != 1 {
            return Err(CompositionError::UnsupportedStatement(format!(
                "{} statements",
                statements.len()
            )));
        }
        match statements.remove(0) {
            Statement::Query(mut query) => {
                let ctes = self.optimize_query(&mut query)?;
                debug!(count = ctes.len(), "Generated CTEs");
                Ok(query.to_string())
            }
            other => Err(CompositionError::UnsupportedStatement(statement_kind(&other))),
        }
    }

    /// Optimizes `query` in place and returns the CTEs added to its `WITH` list.
    pub fn optimize_query(&self, query: &mut Query) -> Result<Vec<GeneratedCte>, CompositionError> {
        let existing: Vec<String> = query
            .with
            .as_ref()
            .map(|with| {
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.clone())
                    .collect()
            })
            .unwrap_or_default();
        let mut decomposer = CteDecomposer::new().with_reserved_names(&existing);

        if let Some(with) = query.with.as_mut() {
            for cte in &mut with.cte_tables {
                rewrite_query(&mut cte.query, &mut decomposer)?;
            }
        }
        rewrite_query(query, &mut decomposer)?;

        let generated: Vec<GeneratedCte> = decomposer.ctes().cloned().collect();
        if generated.is_empty() {
            return Ok(generated);
        }

        let mut with = parse_with(&generated)?;
        match query.with.as_mut() {
            Some(existing) => {
                with.cte_tables.append(&mut existing.cte_tables);
                existing.cte_tables = with.cte_tables;
            }
            None => query.with = Some(with),
        }
        Ok(generated)
    }
}

/// Outer relation of a rewritten select and the column names its joined CTEs added.
struct JoinedCtes {
    outer_alias: String,
    columns: Vec<String>,
    /// Output names of the select, which `HAVING` and `ORDER BY` may refer to.
    output_names: Vec<String>,
}

impl JoinedCtes {
    fn new(outer_alias: String, ctes: &[GeneratedCte], select: &Select) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for column in ctes.iter().flat_map(|cte| &cte.columns) {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                columns.push(column.clone());
            }
        }
        let output_names = select
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::ExprWithAlias { alias, .. } => Some(alias.value.clone()),
                _ => None,
            })
            .collect();
        Self {
            outer_alias,
            columns,
            output_names,
        }
    }

    /// Qualifies bare references to a CTE column with the outer alias; before the
    /// joins they could only mean the outer relation.
    fn qualify(&self, expr: &mut Expr) {
        self.qualify_except(expr, &[]);
    }

    fn qualify_except(&self, expr: &mut Expr, keep: &[String]) {
        visit_expr_mut(expr, &mut |e| {
            if let Expr::Identifier(ident) = e {
                let clashes = self.columns.iter().any(|c| same_name(ident, c))
                    && !keep.iter().any(|k| same_name(ident, k));
                if clashes {
                    let column = ident.clone();
                    *e = Expr::CompoundIdentifier(vec![Ident::new(&self.outer_alias), column]);
                }
            }
        });
    }

    fn qualify_select(&self, select: &mut Select) {
        for item in &mut select.projection {
            if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
                self.qualify(expr);
            }
        }
        if let Some(selection) = select.selection.as_mut() {
            self.qualify(selection);
        }
        if let GroupByExpr::Expressions(exprs, _) = &mut select.group_by {
            for expr in exprs {
                self.qualify(expr);
            }
        }
        if let Some(having) = select.having.as_mut() {
            self.qualify_except(having, &self.output_names);
        }
    }

    fn qualify_order_by(&self, query: &mut Query) {
        if let Some(order_by) = query.order_by.as_mut() {
            if let OrderByKind::Expressions(exprs) = &mut order_by.kind {
                for order_expr in exprs {
                    self.qualify_except(&mut order_expr.expr, &self.output_names);
                }
            }
        }
    }
}

fn same_name(ident: &Ident, column: &str) -> bool {
    match ident.quote_style {
        None => ident.value.eq_ignore_ascii_case(column),
        Some(_) => ident.value == column,
    }
}

fn rewrite_query(query: &mut Query, decomposer: &mut CteDecomposer) -> Result<(), CompositionError> {
    // ORDER BY of a set operation names output columns and is left as written.
    if let Some(joined) = rewrite_set_expr(&mut query.body, decomposer)? {
        joined.qualify_order_by(query);
    }
    Ok(())
}

fn rewrite_set_expr(
    body: &mut SetExpr,
    decomposer: &mut CteDecomposer,
) -> Result<Option<JoinedCtes>, CompositionError> {
    match body {
        SetExpr::Select(select) => rewrite_select(select, decomposer),
        SetExpr::Query(query) => rewrite_query(query, decomposer).map(|()| None),
        SetExpr::SetOperation { left, right, .. } => {
            rewrite_set_expr(left, decomposer)?;
            rewrite_set_expr(right, decomposer)?;
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn rewrite_select(
    select: &mut Select,
    decomposer: &mut CteDecomposer,
) -> Result<Option<JoinedCtes>, CompositionError> {
    for table in &mut select.from {
        if let TableFactor::Derived { subquery, .. } = &mut table.relation {
            rewrite_query(subquery, decomposer)?;
        }
    }

    let decomposed = decomposer.decompose(select)?;
    if decomposed.is_empty() {
        return Ok(None);
    }
    let Some(outer_alias) = outer_alias(select) else {
        return Ok(None);
    };

    select.selection = decomposed.transformed_where;
    for cte in &decomposed.ctes {
        if let Some(join) = cte.join_sql(&outer_alias) {
            select.from[0].joins.push(parse_join(&join)?);
        }
    }

    let joined = JoinedCtes::new(outer_alias, &decomposed.ctes, select);
    joined.qualify_select(select);
    Ok(Some(joined))
}

fn outer_alias(select: &Select) -> Option<String> {
    match &select.from.first()?.relation {
        TableFactor::Table { name, alias, .. } => Some(
            alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| name.to_string()),
        ),
        TableFactor::Derived {
            alias: Some(alias), ..
        } => Some(alias.name.value.clone()),
        _ => None,
    }
}

fn parse_with(ctes: &[GeneratedCte]) -> Result<With, CompositionError> {
    let definitions = ctes
        .iter()
        .map(GeneratedCte::definition)
        .collect::<Vec<_>>()
        .join(", ");
    let query = parse_template(&format!("with {definitions} select 1"))?;
    query
        .with
        .ok_or_else(|| CompositionError::MalformedPredicate(definitions))
}

fn parse_join(join: &str) -> Result<Join, CompositionError> {
    let query = parse_template(&format!("select 1 from t {join}"))?;
    let SetExpr::Select(mut select) = *query.body else {
        return Err(CompositionError::MalformedPredicate(join.to_string()));
    };
    select
        .from
        .pop()
        .and_then(|mut table| table.joins.pop())
        .ok_or_else(|| CompositionError::MalformedPredicate(join.to_string()))
}

fn parse_template(sql: &str) -> Result<Query, CompositionError> {
    let mut statements = parse_sql_with_dialect(sql, Dialect::Postgres)
        .map_err(|err| CompositionError::MalformedPredicate(format!("{sql}: {err}")))?;
    match statements.pop() {
        Some(Statement::Query(query)) => Ok(*query),
        _ => Err(CompositionError::MalformedPredicate(sql.to_string())),
    }
}

fn statement_kind(statement: &Statement) -> String {
    let rendered = statement.to_string();
    rendered
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}
