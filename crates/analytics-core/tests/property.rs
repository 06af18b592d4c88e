use dhis_analytics_core::sql::{PostgreSqlBuilder, SqlBuilder};
use dhis_analytics_core::{CteOptimizationPipeline, Table, Uid};
use proptest::prelude::*;
use sqlparser::ast::{Expr, Value};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

fn parse_expr(sql: &str) -> Expr {
    Parser::new(&PostgreSqlDialect {})
        .try_with_sql(sql)
        .and_then(|mut p| p.parse_expr())
        .unwrap()
}

proptest! {
    #[test]
    fn staging_name_round_trip(name in "[a-z][a-z0-9_]{0,24}") {
        prop_assume!(!Table::is_staging(&name));

        let staging = Table::to_staging(&name);
        prop_assert!(Table::is_staging(&staging));
        prop_assert_eq!(Table::from_staging(&staging), name);
    }

    #[test]
    fn quoted_literal_reads_back_verbatim(value in "[ -\\[\\]-~]{0,30}") {
        let literal = PostgreSqlBuilder::new().single_quote(&value);

        match parse_expr(&literal) {
            Expr::Value(v) => {
                prop_assert_eq!(v.value, Value::SingleQuotedString(value));
            }
            other => prop_assert!(false, "not a literal: {other:?}"),
        }
    }

    #[test]
    fn quoted_identifier_reads_back_verbatim(name in "[ -~]{1,20}") {
        let quoted = PostgreSqlBuilder::new().quote(&name);

        match parse_expr(&quoted) {
            Expr::Identifier(ident) => prop_assert_eq!(ident.value, name),
            other => prop_assert!(false, "not an identifier: {other:?}"),
        }
    }

    #[test]
    fn uid_accepts_only_eleven_alphanumerics(value in "[a-zA-Z0-9_'-]{0,14}") {
        let expected = value.len() == 11
            && value.starts_with(|c: char| c.is_ascii_alphabetic())
            && value.chars().all(|c| c.is_ascii_alphanumeric());
        prop_assert_eq!(Uid::parse(&value).is_ok(), expected);
    }

    #[test]
    fn optimizing_twice_changes_nothing(
        attribute in "[a-zA-Z][a-zA-Z0-9]{10}",
        value in "[a-z]{1,8}",
    ) {
        let sql = format!(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax \
             where (select value from analytics_rs_trackedentityattributevalue teav \
             where teav.trackedentity = subax.trackedentity \
             and teav.trackedentityattribute = '{attribute}') = '{value}'"
        );
        let pipeline = CteOptimizationPipeline::default();

        let once = pipeline.optimize(&sql).unwrap();
        let twice = pipeline.optimize(&once).unwrap();
        let expected_prefix = format!("WITH teav_{} AS (", attribute.to_lowercase());
        prop_assert!(once.starts_with(&expected_prefix));
        prop_assert_eq!(once, twice);
    }
}
