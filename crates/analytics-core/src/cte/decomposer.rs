use super::pattern::{classify_exists, classify_scalar, Extraction, OuterScope, PatternKind};
use super::{DecomposedCtes, GeneratedCte};
use crate::error::CompositionError;
use sqlparser::ast::{Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Select};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::{HashMap, HashSet};
use tracing::debug;

struct Registered {
    cte: GeneratedCte,
    replacement: Expr,
}

/// Extracts correlated subqueries from `WHERE` clauses into CTEs.
///
/// A decomposer keeps its registry across calls, so subqueries with the same signature
/// in different selects of one statement share a single CTE. Use a fresh decomposer per
/// statement.
#[derive(Default)]
pub struct CteDecomposer {
    reserved: HashSet<String>,
    registered: Vec<Registered>,
    by_signature: HashMap<String, usize>,
    exists_count: usize,
}

impl CteDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names that generated CTEs and aliases must not take, typically the CTEs already
    /// defined by the statement.
    pub fn with_reserved_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reserved
            .extend(names.into_iter().map(|n| n.as_ref().to_lowercase()));
        self
    }

    /// Every CTE generated so far, in first-use order.
    pub fn ctes(&self) -> impl Iterator<Item = &GeneratedCte> {
        self.registered.iter().map(|r| &r.cte)
    }

    /// Rewrites the `WHERE` clause of `select`.
    ///
    /// Returns [`DecomposedCtes::empty`] when the select has no `WHERE`, no single outer
    /// relation, or no extractable subquery.
    pub fn decompose(&mut self, select: &Select) -> Result<DecomposedCtes, CompositionError> {
        let (Some(selection), Some(scope)) = (select.selection.as_ref(), OuterScope::of(select))
        else {
            return Ok(DecomposedCtes::empty());
        };

        let mut rewritten = selection.clone();
        let mut used = Vec::new();
        self.rewrite(&mut rewritten, &scope, &mut used)?;
        if used.is_empty() {
            return Ok(DecomposedCtes::empty());
        }

        Ok(DecomposedCtes {
            ctes: used
                .into_iter()
                .map(|index| self.registered[index].cte.clone())
                .collect(),
            transformed_where: Some(rewritten),
            original_select: Some(select.clone()),
        })
    }

    fn rewrite(
        &mut self,
        expr: &mut Expr,
        scope: &OuterScope,
        used: &mut Vec<usize>,
    ) -> Result<(), CompositionError> {
        let extraction = match expr {
            Expr::Subquery(query) => classify_scalar(query, scope),
            Expr::Exists {
                subquery,
                negated: false,
            } => classify_exists(subquery, scope),
            _ => None,
        };
        if let Some(extraction) = extraction {
            let index = self.register(extraction)?;
            if !used.contains(&index) {
                used.push(index);
            }
            *expr = self.registered[index].replacement.clone();
            return Ok(());
        }

        match expr {
            Expr::BinaryOp { left, right, .. } => {
                self.rewrite(left, scope, used)?;
                self.rewrite(right, scope, used)?;
            }
            Expr::UnaryOp { expr: inner, .. }
            | Expr::Nested(inner)
            | Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::IsTrue(inner)
            | Expr::IsFalse(inner)
            | Expr::Cast { expr: inner, .. } => self.rewrite(inner, scope, used)?,
            Expr::InList { expr: inner, list, .. } => {
                self.rewrite(inner, scope, used)?;
                for item in list {
                    self.rewrite(item, scope, used)?;
                }
            }
            Expr::Between {
                expr: inner,
                low,
                high,
                ..
            } => {
                self.rewrite(inner, scope, used)?;
                self.rewrite(low, scope, used)?;
                self.rewrite(high, scope, used)?;
            }
            Expr::Like {
                expr: inner,
                pattern,
                ..
            }
            | Expr::ILike {
                expr: inner,
                pattern,
                ..
            } => {
                self.rewrite(inner, scope, used)?;
                self.rewrite(pattern, scope, used)?;
            }
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                if let Some(operand) = operand {
                    self.rewrite(operand, scope, used)?;
                }
                for when in conditions {
                    self.rewrite(&mut when.condition, scope, used)?;
                    self.rewrite(&mut when.result, scope, used)?;
                }
                if let Some(else_result) = else_result {
                    self.rewrite(else_result, scope, used)?;
                }
            }
            Expr::Function(func) => {
                if let FunctionArguments::List(list) = &mut func.args {
                    for arg in &mut list.args {
                        if let FunctionArg::Unnamed(FunctionArgExpr::Expr(inner)) = arg {
                            self.rewrite(inner, scope, used)?;
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn register(&mut self, extraction: Extraction) -> Result<usize, CompositionError> {
        let signature = extraction.signature();
        if let Some(&index) = self.by_signature.get(&signature) {
            return Ok(index);
        }

        let (base_name, base_alias) = match extraction.kind {
            PatternKind::EnrollmentExists => {
                self.exists_count += 1;
                let (name, alias) = extraction.kind.base_names();
                (
                    format!("{name}_{}", self.exists_count),
                    format!("{alias}{}", self.exists_count),
                )
            }
            _ => extraction.kind.base_names(),
        };
        let name = self.unique(&base_name);
        let join_alias = self.unique(&base_alias);

        let replacement_sql = extraction.replacement_sql(&join_alias);
        let replacement = parse_expr(&replacement_sql)?;
        let replacement = match extraction.kind {
            PatternKind::EnrollmentExists => Expr::Nested(Box::new(replacement)),
            _ => replacement,
        };

        let cte = GeneratedCte {
            name,
            sql: extraction.cte_sql(),
            join_alias,
            join_columns: Some((extraction.outer_key.clone(), extraction.inner_key.clone())),
            columns: extraction.columns(),
        };
        debug!(cte = %cte.name, alias = %cte.join_alias, "Extracted correlated subquery");

        self.reserved.insert(cte.name.to_lowercase());
        self.reserved.insert(cte.join_alias.to_lowercase());
        self.registered.push(Registered { cte, replacement });
        let index = self.registered.len() - 1;
        self.by_signature.insert(signature, index);
        Ok(index)
    }

    fn unique(&self, base: &str) -> String {
        if !self.reserved.contains(&base.to_lowercase()) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.reserved.contains(&candidate.to_lowercase()))
            .unwrap_or_else(|| base.to_string())
    }
}

fn parse_expr(sql: &str) -> Result<Expr, CompositionError> {
    Parser::new(&PostgreSqlDialect {})
        .try_with_sql(sql)
        .and_then(|mut parser| parser.parse_expr())
        .map_err(|err| CompositionError::MalformedPredicate(format!("{sql}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;
    use crate::types::Dialect;
    use sqlparser::ast::SetExpr;

    fn select(sql: &str) -> Select {
        let query = parse_query(sql, Dialect::Postgres).unwrap();
        match *query.body {
            SetExpr::Select(select) => *select,
            other => panic!("expected select, got {other}"),
        }
    }

    const TEAV: &str = "(select value from analytics_rs_trackedentityattributevalue teav \
         where teav.trackedentity = subax.trackedentity \
         and teav.trackedentityattribute = 'w75KJ2mc4zz')";

    #[test]
    fn test_identical_predicates_share_one_cte() {
        let select = select(&format!(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax \
             where {TEAV} = 'X' and {TEAV} = 'X'"
        ));
        let result = CteDecomposer::new().decompose(&select).unwrap();

        assert_eq!(result.ctes.len(), 1);
        assert_eq!(result.ctes[0].name, "teav_w75kj2mc4zz");
        assert_eq!(result.ctes[0].join_alias, "teav_w75KJ2mc4zz");
        assert_eq!(
            result.transformed_where.unwrap().to_string(),
            "teav_w75KJ2mc4zz.value = 'X' AND teav_w75KJ2mc4zz.value = 'X'"
        );
        assert!(result.original_select.is_some());
    }

    #[test]
    fn test_nothing_extractable_returns_empty() {
        let select = select(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax \
             where enrollmentdate > '2024-01-01' and ou in ('ImspTQPwCqd')",
        );
        assert_eq!(
            CteDecomposer::new().decompose(&select).unwrap(),
            DecomposedCtes::empty()
        );
    }

    #[test]
    fn test_no_where_returns_empty() {
        let select = select("select enrollment from analytics_enrollment_ur1edk5oe2n as subax");
        assert!(CteDecomposer::new().decompose(&select).unwrap().is_empty());
    }

    #[test]
    fn test_last_created() {
        let select = select(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select created from analytics_event_ur1Edk5Oe2n \
              where analytics_event_ur1Edk5Oe2n.enrollment = subax.enrollment \
              and created is not null order by occurreddate desc limit 1) is not null",
        );
        let result = CteDecomposer::new().decompose(&select).unwrap();

        assert_eq!(result.ctes.len(), 1);
        let cte = &result.ctes[0];
        assert_eq!(cte.name, "last_created");
        assert_eq!(
            cte.join_sql("subax").unwrap(),
            "left join last_created as lc on subax.enrollment = lc.enrollment"
        );
        assert_eq!(
            result.transformed_where.unwrap().to_string(),
            "lc.created IS NOT NULL"
        );
    }

    #[test]
    fn test_enrollment_exists_is_numbered() {
        let select = select(
            "select trackedentity from analytics_te_neenwmsyuep as t_1 where \
             exists (select 1 from analytics_enrollment_ur1edk5oe2n \
                     where analytics_enrollment_ur1edk5oe2n.trackedentity = t_1.trackedentity \
                     and enrollmentstatus = 'ACTIVE') \
             and not exists (select 1 from analytics_enrollment_ur1edk5oe2n \
                     where analytics_enrollment_ur1edk5oe2n.trackedentity = t_1.trackedentity \
                     and enrollmentstatus = 'COMPLETED')",
        );
        let result = CteDecomposer::new().decompose(&select).unwrap();

        assert_eq!(result.ctes.len(), 1);
        assert_eq!(result.ctes[0].name, "enrollment_exists_1");
        assert_eq!(result.ctes[0].join_alias, "ee1");
        assert_eq!(
            result.ctes[0].sql,
            "select distinct trackedentity from analytics_enrollment_ur1edk5oe2n \
             where enrollmentstatus = 'ACTIVE'"
        );
        let rewritten = result.transformed_where.unwrap().to_string();
        assert!(rewritten.starts_with("(ee1.trackedentity IS NOT NULL) AND NOT EXISTS"));
    }

    #[test]
    fn test_names_avoid_reserved() {
        let select = select(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select scheduleddate from analytics_event_ur1edk5oe2n \
              where analytics_event_ur1edk5oe2n.enrollment = subax.enrollment \
              order by occurreddate desc limit 1) is not null",
        );
        let mut decomposer = CteDecomposer::new().with_reserved_names(["LAST_SCHED", "ls"]);
        let result = decomposer.decompose(&select).unwrap();
        assert_eq!(result.ctes[0].name, "last_sched_2");
        assert_eq!(result.ctes[0].join_alias, "ls_2");
    }

    #[test]
    fn test_registry_is_shared_across_selects() {
        let first = select(&format!(
            "select enrollment from analytics_enrollment_a as subax where {TEAV} = 'X'"
        ));
        let second = select(&format!(
            "select enrollment from analytics_enrollment_b as subax where {TEAV} = 'Y'"
        ));
        let mut decomposer = CteDecomposer::new();
        let a = decomposer.decompose(&first).unwrap();
        let b = decomposer.decompose(&second).unwrap();
        assert_eq!(a.ctes, b.ctes);
        assert_eq!(decomposer.ctes().count(), 1);
    }
}
