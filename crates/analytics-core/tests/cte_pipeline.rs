use dhis_analytics_core::parser::parse_query;
use dhis_analytics_core::test_utils::load_sql_fixture;
use dhis_analytics_core::{CteDecomposer, CteOptimizationPipeline, DecomposedCtes, Dialect};
use rstest::rstest;
use rusqlite::Connection;
use sqlparser::ast::SetExpr;

fn optimize(name: &str) -> String {
    let sql = load_sql_fixture("cte", name);
    CteOptimizationPipeline::default()
        .optimize(&sql)
        .unwrap_or_else(|e| panic!("{name}: {e}"))
        .to_lowercase()
}

#[test]
fn duplicate_attribute_filter_yields_one_cte_used_twice() {
    let sql = load_sql_fixture("cte", "duplicate_attribute_filter.sql");
    let query = parse_query(&sql, Dialect::Postgres).unwrap();
    let SetExpr::Select(select) = query.body.as_ref() else {
        panic!("expected select");
    };

    let decomposed = CteDecomposer::new().decompose(select).unwrap();
    assert_eq!(decomposed.ctes.len(), 1);
    let cte = &decomposed.ctes[0];
    let rewritten = decomposed.transformed_where.unwrap().to_string();
    assert_eq!(
        rewritten,
        format!(
            "{alias}.value = 'X' AND {alias}.value = 'X'",
            alias = cte.join_alias
        )
    );
}

#[test]
fn no_subqueries_decomposes_to_empty() {
    let sql = load_sql_fixture("cte", "no_subqueries.sql");
    let query = parse_query(&sql, Dialect::Postgres).unwrap();
    let SetExpr::Select(select) = query.body.as_ref() else {
        panic!("expected select");
    };
    assert_eq!(
        CteDecomposer::new().decompose(select).unwrap(),
        DecomposedCtes::empty()
    );
}

#[rstest]
#[case("last_value_h6usamo5wld as (")]
#[case("de_count_fcxkbdc27bt as (")]
#[case("last_sched as (")]
#[case("left join last_value_h6usamo5wld as lv_h6usamo5wld on subax.enrollment = lv_h6usamo5wld.enrollment")]
#[case("left join de_count_fcxkbdc27bt as dec_fcxkbdc27bt on subax.enrollment = dec_fcxkbdc27bt.enrollment")]
#[case("left join last_sched as ls on subax.enrollment = ls.enrollment")]
#[case("lv_h6usamo5wld.\"h6usamo5wld\" = 'rdt'")]
#[case("coalesce(dec_fcxkbdc27bt.de_count, 0) > 0")]
#[case("ls.scheduleddate is not null")]
#[case("group by subax.enrollment")]
#[case("select subax.enrollment, count(*) as events")]
fn program_indicator_query_is_rewritten(#[case] expected: &str) {
    let optimized = optimize("enrollment_program_indicator.sql");
    assert!(
        optimized.contains(expected),
        "missing `{expected}` in:\n{optimized}"
    );
}

#[test]
fn program_indicator_query_keeps_stage_filter_in_cte() {
    let optimized = optimize("enrollment_program_indicator.sql");
    let start = optimized.find("last_value_h6usamo5wld as (").unwrap();
    let end = optimized[start..].find("), ").unwrap() + start;
    assert!(optimized[start..end].contains("ps = 'a03mvhhogjr'"));
}

#[test]
fn shared_subquery_across_union_branches() {
    let optimized = optimize("union_of_selects.sql");
    assert_eq!(optimized.matches("relationship_count_agg as (").count(), 1);
    assert!(optimized.starts_with("with relationship_count_agg as ("));
    assert!(optimized.contains("left join relationship_count_agg as rlc on b.trackedentity = rlc.trackedentityid"));
    assert!(optimized.contains("left join relationship_count_agg as rlc on subax.trackedentity = rlc.trackedentityid"));
    assert!(optimized.contains("base as ("));
}

#[test]
fn optimized_sql_parses_again() {
    for name in [
        "duplicate_attribute_filter.sql",
        "enrollment_program_indicator.sql",
        "union_of_selects.sql",
        "no_subqueries.sql",
    ] {
        let optimized = CteOptimizationPipeline::default()
            .optimize(&load_sql_fixture("cte", name))
            .unwrap();
        assert!(
            parse_query(&optimized, Dialect::Postgres).is_ok(),
            "{name} does not parse after optimization: {optimized}"
        );
    }
}

const SQLITE_SCHEMA: &str = "
    create table analytics_enrollment_ur1edk5oe2n (enrollment text, trackedentity text, ou text);
    create table analytics_rs_trackedentityattributevalue
        (trackedentity text, trackedentityattribute text, value text);
    create table analytics_event_ur1edk5oe2n
        (enrollment text, occurreddate text, scheduleddate text);

    insert into analytics_enrollment_ur1edk5oe2n values
        ('e1', 't1', 'ImspTQPwCqd'), ('e2', 't2', 'ImspTQPwCqd'), ('e3', 't3', 'O6uvpzGd5pu');
    insert into analytics_rs_trackedentityattributevalue values
        ('t1', 'w75KJ2mc4zz', 'X'), ('t2', 'w75KJ2mc4zz', 'Y'), ('t3', 'zDhUuAYrxNC', 'X');
    insert into analytics_event_ur1edk5oe2n values
        ('e1', '2024-01-01', '2024-02-01'), ('e1', '2024-03-01', null),
        ('e2', '2024-01-05', '2024-04-01');
";

fn sqlite() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SQLITE_SCHEMA).unwrap();
    conn
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0))
        .unwrap_or_else(|e| panic!("{e}\n{sql}"))
}

#[rstest]
#[case::bare_key_in_aggregate(
    "select count(trackedentity) from analytics_enrollment_ur1edk5oe2n as subax \
     where (select value from analytics_rs_trackedentityattributevalue teav \
            where teav.trackedentity = subax.trackedentity \
            and teav.trackedentityattribute = 'w75KJ2mc4zz') = 'X'",
    1
)]
#[case::bare_key_in_remaining_filter(
    "select count(*) from analytics_enrollment_ur1edk5oe2n as subax \
     where trackedentity is not null \
     and (select value from analytics_rs_trackedentityattributevalue teav \
          where teav.trackedentity = subax.trackedentity \
          and teav.trackedentityattribute = 'w75KJ2mc4zz') = 'X'",
    1
)]
#[case::qualified_case_filter(
    "select count(*) from analytics_enrollment_ur1edk5oe2n as subax \
     where (select value from analytics_rs_trackedentityattributevalue teav \
            where teav.trackedentity = subax.trackedentity \
            and teav.trackedentityattribute = 'w75KJ2mc4zz' \
            and case when teav.value = 'X' then 1 else 0 end = 1) = 'X'",
    1
)]
#[case::latest_scheduled_date(
    "select count(enrollment) from analytics_enrollment_ur1edk5oe2n as subax \
     where (select scheduleddate from analytics_event_ur1edk5oe2n \
            where analytics_event_ur1edk5oe2n.enrollment = subax.enrollment \
            order by occurreddate desc limit 1) is not null",
    1
)]
fn optimized_sql_returns_same_rows_on_sqlite(#[case] sql: &str, #[case] expected: i64) {
    let conn = sqlite();
    let optimized = CteOptimizationPipeline::default().optimize(sql).unwrap();
    assert!(optimized.starts_with("WITH "), "nothing extracted: {optimized}");

    assert_eq!(count(&conn, sql), expected);
    assert_eq!(count(&conn, &optimized), expected);
}
