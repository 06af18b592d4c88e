//! Table model, analytics table planning, generation and staging swap.

mod analytics;
pub mod generator;
mod manager;
mod model;
pub mod swap;

pub use analytics::{AnalyticsTable, AnalyticsTableColumn, AnalyticsTablePartition};
pub use generator::{AnalyticsTableGenerator, GenerationReport, PartitionReport, TableReport};
pub use manager::{
    AnalyticsTableDefinition, AnalyticsTableManager, AnalyticsTableUpdateParams, BuildContext,
    SqlTableManager,
};
pub use model::{Collation, Column, DataType, Index, IndexType, Logged, Nullable, Table};
pub use swap::{StagingSwap, SwapPair};
