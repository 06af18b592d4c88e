//! Output formatting modules.

pub mod json;
pub mod table;

use dhis_analytics_core::outlier::OutlierDetectionRequest;
use serde::Serialize;

pub use json::format_json;
pub use table::{
    format_generation, format_job_run, format_optimized, format_outliers, format_replication,
};

/// Resolved outlier request and the SQL that answers it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierReport {
    pub request: OutlierDetectionRequest,
    pub sql: String,
}

/// Optimized form of one input query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedQuery {
    pub source: String,
    pub sql: String,
}
