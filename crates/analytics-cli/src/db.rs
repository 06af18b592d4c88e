//! [`SqlExecutor`] implementations used by the CLI.
//!
//! [`SqlxExecutor`] runs statements against PostgreSQL or SQLite through a SQLx `Any`
//! pool. [`DryRunExecutor`] only records what would have been executed.

use dhis_analytics_core::{ExecutionError, SqlExecutor};
use std::sync::{Mutex, PoisonError};

/// Database type inferred from connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    Postgres,
    Sqlite,
}

impl DatabaseType {
    /// Infer database type from a connection URL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if url.starts_with("sqlite://") || url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }
}

#[cfg(feature = "database")]
pub use sqlx_executor::SqlxExecutor;

#[cfg(feature = "database")]
mod sqlx_executor {
    use super::*;
    use dhis_analytics_core::sql::SqlBuilder;
    use sqlx::any::{AnyPoolOptions, AnyRow};
    use sqlx::{AnyPool, Row};
    use std::sync::Arc;
    use tokio::runtime::Runtime;
    use tracing::debug;

    /// Executor over a SQLx connection pool.
    ///
    /// Calls block on an owned runtime, so the executor can be shared by the
    /// generator's worker threads. It must not be used from inside an async context.
    pub struct SqlxExecutor {
        runtime: Runtime,
        pool: AnyPool,
        builder: Arc<dyn SqlBuilder>,
    }

    impl SqlxExecutor {
        /// Connects to the database at `url`.
        pub fn connect(
            url: &str,
            max_connections: u32,
            builder: Arc<dyn SqlBuilder>,
        ) -> Result<Self, ExecutionError> {
            if DatabaseType::from_url(url).is_none() {
                return Err(ExecutionError::new(format!(
                    "Unsupported database URL scheme: {}",
                    redact(url)
                )));
            }
            sqlx::any::install_default_drivers();

            let runtime = Runtime::new().map_err(|e| ExecutionError::new(e.to_string()))?;
            let pool = runtime
                .block_on(
                    AnyPoolOptions::new()
                        .max_connections(max_connections.max(1))
                        .connect(url),
                )
                .map_err(|e| ExecutionError::new(e.to_string()))?;
            debug!(url = %redact(url), "Connected to database");

            Ok(Self {
                runtime,
                pool,
                builder,
            })
        }

        fn fetch_all(&self, sql: &str) -> Result<Vec<AnyRow>, ExecutionError> {
            self.runtime
                .block_on(sqlx::query(sql).fetch_all(&self.pool))
                .map_err(|e| database_error(e, sql))
        }
    }

    impl SqlExecutor for SqlxExecutor {
        fn execute(&self, sql: &str) -> Result<u64, ExecutionError> {
            debug!(sql, "Executing statement");
            self.runtime
                .block_on(sqlx::raw_sql(sql).execute(&self.pool))
                .map(|result| result.rows_affected())
                .map_err(|e| database_error(e, sql))
        }

        fn execute_atomic(&self, statements: &[String]) -> Result<(), ExecutionError> {
            self.runtime.block_on(async {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| ExecutionError::new(e.to_string()))?;
                for sql in statements {
                    debug!(sql = sql.as_str(), "Executing statement in transaction");
                    sqlx::raw_sql(sql)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| database_error(e, sql))?;
                }
                tx.commit()
                    .await
                    .map_err(|e| ExecutionError::new(e.to_string()))
            })
        }

        fn query_integers(&self, sql: &str) -> Result<Vec<i64>, ExecutionError> {
            self.fetch_all(sql)?
                .iter()
                .map(|row| integer_from_row(row).ok_or_else(|| {
                    ExecutionError::new("Query did not return an integer column").with_sql(sql)
                }))
                .collect()
        }

        fn table_exists(&self, table_name: &str) -> Result<bool, ExecutionError> {
            Ok(!self
                .fetch_all(&self.builder.table_exists_sql(table_name))?
                .is_empty())
        }
    }

    /// Reads the first column as an integer, handling the representations drivers
    /// use for year expressions.
    fn integer_from_row(row: &AnyRow) -> Option<i64> {
        if let Ok(val) = row.try_get::<i64, _>(0) {
            return Some(val);
        }
        if let Ok(val) = row.try_get::<i32, _>(0) {
            return Some(i64::from(val));
        }
        if let Ok(val) = row.try_get::<f64, _>(0) {
            return Some(val as i64);
        }
        None
    }

    fn database_error(err: sqlx::Error, sql: &str) -> ExecutionError {
        ExecutionError::new(err.to_string()).with_sql(sql)
    }
}

/// Executor that records statements instead of running them.
///
/// Integer queries (data years) are answered with the configured years and no table
/// exists, so every run plans a full build.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    years: Vec<i64>,
    statements: Mutex<Vec<String>>,
}

impl DryRunExecutor {
    pub fn new(years: Vec<i64>) -> Self {
        Self {
            years,
            ..Default::default()
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, sql: &str) {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
    }
}

impl SqlExecutor for DryRunExecutor {
    fn execute(&self, sql: &str) -> Result<u64, ExecutionError> {
        self.record(sql);
        Ok(0)
    }

    fn execute_atomic(&self, statements: &[String]) -> Result<(), ExecutionError> {
        for sql in statements {
            self.record(sql);
        }
        Ok(())
    }

    fn query_integers(&self, sql: &str) -> Result<Vec<i64>, ExecutionError> {
        self.record(sql);
        Ok(self.years.clone())
    }

    fn table_exists(&self, _table_name: &str) -> Result<bool, ExecutionError> {
        Ok(false)
    }
}

/// Hides the password of a connection URL.
pub fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{user}:***{}", &url[..scheme_end + 3], &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}
