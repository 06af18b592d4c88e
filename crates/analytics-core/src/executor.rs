//! Contract for the externally supplied database capability.
//!
//! The engine never opens connections itself. Drivers and pools live outside the
//! core; the CLI provides a `sqlx` implementation.

use crate::error::ExecutionError;

/// Executes SQL against one database.
///
/// Implementations must be usable from several worker threads at once; each call is
/// expected to borrow its own connection from a pool.
pub trait SqlExecutor: Send + Sync {
    /// Executes a single statement and returns the number of affected rows.
    fn execute(&self, sql: &str) -> Result<u64, ExecutionError>;

    /// Executes all statements in one transaction: either every statement takes
    /// effect or none does.
    fn execute_atomic(&self, statements: &[String]) -> Result<(), ExecutionError>;

    /// Runs a query returning a single integer column.
    fn query_integers(&self, sql: &str) -> Result<Vec<i64>, ExecutionError>;

    /// Whether a table with this name exists.
    fn table_exists(&self, table_name: &str) -> Result<bool, ExecutionError>;
}
