//! Analytics table generation and query composition.
//!
//! The crate plans and builds denormalized analytics tables behind staging tables that
//! are swapped in atomically, runs the continuous update job, mirrors reference tables,
//! and composes the SQL that reads from the analytics tables: CTE decomposition of
//! correlated subqueries, clause elements and outlier detection.
//!
//! All database access goes through an injected [`SqlExecutor`].

pub mod cte;
pub mod error;
pub mod executor;
pub mod job;
pub mod outlier;
pub mod parser;
pub mod query;
pub mod replication;
pub mod sql;
pub mod table;
pub mod types;

pub use cte::{CteDecomposer, CteOptimizationPipeline, DecomposedCtes, GeneratedCte};
pub use error::{
    BuildError, CompositionError, ErrorCode, ExecutionError, IllegalQueryError, JobError,
    ParseError, TableError, WatermarkError,
};
pub use executor::SqlExecutor;
pub use job::{
    ContinuousAnalyticsTableJob, ContinuousJobSettings, InMemoryWatermarkStore, JobRun,
    JobRunKind, Watermark, WatermarkStore,
};
pub use parser::{parse_query, parse_sql, parse_sql_with_dialect};
pub use replication::{ReplicationReport, TableReplicationService};
pub use table::{
    AnalyticsTableDefinition, AnalyticsTableGenerator, AnalyticsTableUpdateParams,
    GenerationReport, Table,
};
pub use types::{issue_codes, CancellationToken, Dialect, Issue, Severity, Uid};

// Test utilities shared with the integration tests (must be at end of file)
#[doc(hidden)]
pub mod test_utils;
