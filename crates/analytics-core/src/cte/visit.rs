//! Expression walkers used by subquery recognition and the rewrite pass.
//!
//! [`visit_expr`] follows nested subqueries so that correlated references anywhere
//! below an expression are seen. [`visit_expr_mut`] stays in the scope of the select
//! the expression belongs to: nested subqueries resolve bare names against their own
//! `FROM` and are left alone.

use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, OrderByKind, Query,
    SelectItem, SetExpr, TableFactor,
};

/// Calls `visitor` on `expr` and every expression below it, subqueries included.
pub(crate) fn visit_expr<F: FnMut(&Expr)>(expr: &Expr, visitor: &mut F) {
    visitor(expr);
    match expr {
        Expr::BinaryOp { left, right, .. }
        | Expr::IsDistinctFrom(left, right)
        | Expr::IsNotDistinctFrom(left, right) => {
            visit_expr(left, visitor);
            visit_expr(right, visitor);
        }
        Expr::UnaryOp { expr: inner, .. }
        | Expr::Nested(inner)
        | Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::IsTrue(inner)
        | Expr::IsFalse(inner)
        | Expr::Cast { expr: inner, .. } => visit_expr(inner, visitor),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                visit_expr(operand, visitor);
            }
            for when in conditions {
                visit_expr(&when.condition, visitor);
                visit_expr(&when.result, visitor);
            }
            if let Some(else_result) = else_result {
                visit_expr(else_result, visitor);
            }
        }
        Expr::Function(func) => match &func.args {
            FunctionArguments::Subquery(query) => visit_query(query, visitor),
            FunctionArguments::List(list) => {
                for arg in &list.args {
                    match arg {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(inner))
                        | FunctionArg::Named {
                            arg: FunctionArgExpr::Expr(inner),
                            ..
                        } => visit_expr(inner, visitor),
                        FunctionArg::ExprNamed { name, arg, .. } => {
                            visit_expr(name, visitor);
                            if let FunctionArgExpr::Expr(inner) = arg {
                                visit_expr(inner, visitor);
                            }
                        }
                        _ => {}
                    }
                }
            }
            FunctionArguments::None => {}
        },
        Expr::InList { expr: inner, list, .. } => {
            visit_expr(inner, visitor);
            for item in list {
                visit_expr(item, visitor);
            }
        }
        Expr::InSubquery {
            expr: inner,
            subquery,
            ..
        } => {
            visit_expr(inner, visitor);
            visit_query(subquery, visitor);
        }
        Expr::Subquery(subquery) | Expr::Exists { subquery, .. } => visit_query(subquery, visitor),
        Expr::Between {
            expr: inner,
            low,
            high,
            ..
        } => {
            visit_expr(inner, visitor);
            visit_expr(low, visitor);
            visit_expr(high, visitor);
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
            visit_expr(inner, visitor);
            visit_expr(pattern, visitor);
        }
        _ => {}
    }
}

fn visit_query<F: FnMut(&Expr)>(query: &Query, visitor: &mut F) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            visit_query(&cte.query, visitor);
        }
    }
    visit_set_expr(&query.body, visitor);
    if let Some(order_by) = &query.order_by {
        if let OrderByKind::Expressions(exprs) = &order_by.kind {
            for order_expr in exprs {
                visit_expr(&order_expr.expr, visitor);
            }
        }
    }
}

fn visit_set_expr<F: FnMut(&Expr)>(body: &SetExpr, visitor: &mut F) {
    match body {
        SetExpr::Select(select) => {
            for item in &select.projection {
                if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item
                {
                    visit_expr(expr, visitor);
                }
            }
            if let Some(selection) = &select.selection {
                visit_expr(selection, visitor);
            }
            if let Some(having) = &select.having {
                visit_expr(having, visitor);
            }
            if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
                for expr in exprs {
                    visit_expr(expr, visitor);
                }
            }
            for table in &select.from {
                if let TableFactor::Derived { subquery, .. } = &table.relation {
                    visit_query(subquery, visitor);
                }
            }
        }
        SetExpr::Query(query) => visit_query(query, visitor),
        SetExpr::SetOperation { left, right, .. } => {
            visit_set_expr(left, visitor);
            visit_set_expr(right, visitor);
        }
        _ => {}
    }
}

/// Calls `visitor` on `expr` and every expression below it in the same select scope.
///
/// The visitor runs before the children are walked, so a node it replaces is walked
/// in its new form.
pub(crate) fn visit_expr_mut<F: FnMut(&mut Expr)>(expr: &mut Expr, visitor: &mut F) {
    visitor(expr);
    match expr {
        Expr::BinaryOp { left, right, .. }
        | Expr::IsDistinctFrom(left, right)
        | Expr::IsNotDistinctFrom(left, right) => {
            visit_expr_mut(left, visitor);
            visit_expr_mut(right, visitor);
        }
        Expr::UnaryOp { expr: inner, .. }
        | Expr::Nested(inner)
        | Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::IsTrue(inner)
        | Expr::IsFalse(inner)
        | Expr::Cast { expr: inner, .. }
        | Expr::InSubquery { expr: inner, .. } => visit_expr_mut(inner, visitor),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                visit_expr_mut(operand, visitor);
            }
            for when in conditions {
                visit_expr_mut(&mut when.condition, visitor);
                visit_expr_mut(&mut when.result, visitor);
            }
            if let Some(else_result) = else_result {
                visit_expr_mut(else_result, visitor);
            }
        }
        Expr::Function(func) => {
            if let FunctionArguments::List(list) = &mut func.args {
                for arg in &mut list.args {
                    match arg {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(inner))
                        | FunctionArg::Named {
                            arg: FunctionArgExpr::Expr(inner),
                            ..
                        }
                        | FunctionArg::ExprNamed {
                            arg: FunctionArgExpr::Expr(inner),
                            ..
                        } => visit_expr_mut(inner, visitor),
                        _ => {}
                    }
                }
            }
        }
        Expr::InList { expr: inner, list, .. } => {
            visit_expr_mut(inner, visitor);
            for item in list {
                visit_expr_mut(item, visitor);
            }
        }
        Expr::Between {
            expr: inner,
            low,
            high,
            ..
        } => {
            visit_expr_mut(inner, visitor);
            visit_expr_mut(low, visitor);
            visit_expr_mut(high, visitor);
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
            visit_expr_mut(inner, visitor);
            visit_expr_mut(pattern, visitor);
        }
        _ => {}
    }
}
