//! Fuzz target for the CTE optimization pipeline.
//!
//! Arbitrary statements must either be rewritten or rejected with an error, and every
//! rewritten statement must parse again.

#![no_main]

use dhis_analytics_core::{parse_sql_with_dialect, CteOptimizationPipeline, Dialect};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(sql) = std::str::from_utf8(data) {
        if let Ok(optimized) = CteOptimizationPipeline::default().optimize(sql) {
            assert!(
                parse_sql_with_dialect(&optimized, Dialect::Postgres).is_ok(),
                "optimized SQL does not parse: {optimized}"
            );
        }
    }
});
