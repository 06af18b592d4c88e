//! Small expression AST for generated predicates and select columns.
//!
//! Values never reach SQL text except through [`SqlExpr::render`], which quotes
//! identifiers and escapes literals with the dialect's [`SqlBuilder`].

use super::builder::SqlBuilder;
use super::select::SelectBuilder;
use crate::table::DataType;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    ILike,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "like",
            Self::ILike => "ilike",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// Column reference. The qualifier is a table alias chosen by the caller and is
    /// rendered verbatim; the name is always quoted.
    Column {
        qualifier: Option<String>,
        name: String,
    },
    Literal(Literal),
    Compare {
        left: Box<SqlExpr>,
        op: CompareOp,
        right: Box<SqlExpr>,
    },
    And(Vec<SqlExpr>),
    Or(Vec<SqlExpr>),
    Not(Box<SqlExpr>),
    IsNull(Box<SqlExpr>),
    IsNotNull(Box<SqlExpr>),
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
    },
    Exists(Box<SelectBuilder>),
    Subquery(Box<SelectBuilder>),
    /// Function call; the name is a fixed identifier chosen by the caller.
    Function {
        name: &'static str,
        args: Vec<SqlExpr>,
    },
    Cast {
        expr: Box<SqlExpr>,
        data_type: DataType,
    },
    /// Trusted SQL fragment, e.g. a configured table expression. Never built from
    /// request input.
    Raw(String),
}

impl SqlExpr {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Text(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Self::Literal(Literal::Integer(value))
    }

    pub fn number(value: f64) -> Self {
        Self::Literal(Literal::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    pub fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    pub fn function(name: &'static str, args: Vec<SqlExpr>) -> Self {
        Self::Function { name, args }
    }

    pub fn exists(select: SelectBuilder) -> Self {
        Self::Exists(Box::new(select))
    }

    pub fn subquery(select: SelectBuilder) -> Self {
        Self::Subquery(Box::new(select))
    }

    pub fn compare(self, op: CompareOp, right: SqlExpr) -> Self {
        Self::Compare {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::Eq, right)
    }

    pub fn gt(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::Gt, right)
    }

    pub fn gt_eq(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::GtEq, right)
    }

    pub fn lt(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::Lt, right)
    }

    pub fn lt_eq(self, right: SqlExpr) -> Self {
        self.compare(CompareOp::LtEq, right)
    }

    pub fn and(self, other: SqlExpr) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: SqlExpr) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Self {
        Self::IsNotNull(Box::new(self))
    }

    pub fn in_list(self, list: Vec<SqlExpr>) -> Self {
        Self::InList {
            expr: Box::new(self),
            list,
        }
    }

    pub fn cast(self, data_type: DataType) -> Self {
        Self::Cast {
            expr: Box::new(self),
            data_type,
        }
    }

    fn is_compound(&self) -> bool {
        matches!(
            self,
            Self::And(_) | Self::Or(_) | Self::Compare { .. } | Self::Not(_)
        )
    }

    fn render_operand(&self, builder: &dyn SqlBuilder) -> String {
        if self.is_compound() {
            format!("({})", self.render(builder))
        } else {
            self.render(builder)
        }
    }

    pub fn render(&self, builder: &dyn SqlBuilder) -> String {
        match self {
            Self::Column { qualifier, name } => match qualifier {
                Some(q) => builder.quote_alias(q, name),
                None => builder.quote(name),
            },
            Self::Literal(literal) => match literal {
                Literal::Text(value) => builder.single_quote(value),
                Literal::Integer(value) => value.to_string(),
                Literal::Number(value) => value.to_string(),
                Literal::Bool(value) => value.to_string(),
                Literal::Null => "null".to_string(),
            },
            Self::Compare { left, op, right } => format!(
                "{} {} {}",
                left.render_operand(builder),
                op.as_sql(),
                right.render_operand(builder)
            ),
            Self::And(parts) => match parts.as_slice() {
                [] => "true".to_string(),
                [single] => single.render(builder),
                _ => parts
                    .iter()
                    .map(|p| match p {
                        Self::Or(_) => format!("({})", p.render(builder)),
                        _ => p.render(builder),
                    })
                    .collect::<Vec<_>>()
                    .join(" and "),
            },
            Self::Or(parts) => match parts.as_slice() {
                [] => "false".to_string(),
                [single] => single.render(builder),
                _ => parts
                    .iter()
                    .map(|p| match p {
                        Self::And(_) => format!("({})", p.render(builder)),
                        _ => p.render(builder),
                    })
                    .collect::<Vec<_>>()
                    .join(" or "),
            },
            Self::Not(inner) => format!("not ({})", inner.render(builder)),
            Self::IsNull(inner) => format!("{} is null", inner.render_operand(builder)),
            Self::IsNotNull(inner) => format!("{} is not null", inner.render_operand(builder)),
            Self::InList { expr, list } => format!(
                "{} in ({})",
                expr.render_operand(builder),
                list.iter()
                    .map(|item| item.render(builder))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::Exists(select) => format!("exists ({})", select.render(builder)),
            Self::Subquery(select) => format!("({})", select.render(builder)),
            Self::Function { name, args } => format!(
                "{name}({})",
                args.iter()
                    .map(|a| a.render(builder))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::Cast { expr, data_type } => builder.cast(&expr.render(builder), *data_type),
            Self::Raw(sql) => sql.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::PostgreSqlBuilder;

    #[test]
    fn test_comparison_escapes_literal() {
        let expr = SqlExpr::column("name").eq(SqlExpr::text("O'Neil"));
        assert_eq!(expr.render(&PostgreSqlBuilder::new()), "\"name\" = 'O''Neil'");
    }

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let expr = SqlExpr::column("a")
            .is_not_null()
            .and(SqlExpr::column("b").eq(SqlExpr::integer(1)).or(SqlExpr::column("c").is_null()));
        assert_eq!(
            expr.render(&PostgreSqlBuilder::new()),
            "\"a\" is not null and (\"b\" = 1 or \"c\" is null)"
        );
    }

    #[test]
    fn test_qualified_column_and_in_list() {
        let expr = SqlExpr::qualified("ax", "dx").in_list(vec![
            SqlExpr::text("fbfJHSPpUQD"),
            SqlExpr::text("cYeuwXTCPkU"),
        ]);
        assert_eq!(
            expr.render(&PostgreSqlBuilder::new()),
            "ax.\"dx\" in ('fbfJHSPpUQD', 'cYeuwXTCPkU')"
        );
    }

    #[test]
    fn test_not_and_cast() {
        let expr = SqlExpr::column("value")
            .cast(DataType::Double)
            .gt(SqlExpr::number(2.5))
            .negate();
        assert_eq!(
            expr.render(&PostgreSqlBuilder::new()),
            "not (cast(\"value\" as double precision) > 2.5)"
        );
    }

    #[test]
    fn test_empty_conjunction_is_true() {
        assert_eq!(SqlExpr::And(vec![]).render(&PostgreSqlBuilder::new()), "true");
    }
}
