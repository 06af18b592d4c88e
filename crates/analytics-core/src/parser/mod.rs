use crate::error::ParseError;
use crate::types::Dialect;
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Parse SQL using the specified dialect
pub fn parse_sql_with_dialect(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, ParseError> {
    let sqlparser_dialect = dialect.to_sqlparser_dialect();
    match Parser::parse_sql(sqlparser_dialect.as_ref(), sql) {
        Ok(statements) => Ok(statements),
        Err(primary_err) => {
            // Analytics SQL is written for Postgres; the generic dialect trips over
            // `::` casts and JSON operators.
            if matches!(dialect, Dialect::Generic) && looks_like_postgres_syntax(sql) {
                let postgres = PostgreSqlDialect {};
                if let Ok(statements) = Parser::parse_sql(&postgres, sql) {
                    return Ok(statements);
                }
            }
            Err(ParseError::from(primary_err).with_dialect(dialect))
        }
    }
}

fn looks_like_postgres_syntax(sql: &str) -> bool {
    sql.contains("::") || sql.contains("->") || sql.contains("?|") || sql.contains("?&")
}

/// Parse SQL using the generic dialect
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>, ParseError> {
    parse_sql_with_dialect(sql, Dialect::Generic)
}

/// Parse exactly one query statement.
pub fn parse_query(sql: &str, dialect: Dialect) -> Result<Query, ParseError> {
    let mut statements = parse_sql_with_dialect(sql, dialect)?;
    match (statements.pop(), statements.is_empty()) {
        (Some(Statement::Query(query)), true) => Ok(*query),
        (Some(other), true) => Err(ParseError::new(format!(
            "expected a query, found: {other}"
        ))),
        _ => Err(ParseError::new("expected exactly one statement")),
    }
}
