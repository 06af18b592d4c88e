//! Fuzz target for the SQL parser.
//!
//! `parse_sql_with_dialect()` must return an error for invalid SQL, never panic.

#![no_main]

use arbitrary::Arbitrary;
use dhis_analytics_core::{parse_sql_with_dialect, Dialect};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    sql: String,
    dialect_idx: u8,
}

impl FuzzInput {
    fn dialect(&self) -> Dialect {
        match self.dialect_idx % 4 {
            0 => Dialect::Generic,
            1 => Dialect::Postgres,
            2 => Dialect::Clickhouse,
            _ => Dialect::Sqlite,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let _result = parse_sql_with_dialect(&input.sql, input.dialect());
});
