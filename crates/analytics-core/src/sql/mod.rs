//! Dialect-specific SQL rendering.
//!
//! [`SqlBuilder`] turns the table model into DDL and literals. [`SqlExpr`] and
//! [`SelectBuilder`] compose queries; every identifier and literal passes through the
//! builder's quoting and escaping when rendered.

mod builder;
mod clickhouse;
mod expr;
mod postgres;
mod select;
mod sqlite;

pub use builder::{unescape_backslashes, SqlBuilder};
pub use clickhouse::ClickHouseSqlBuilder;
pub use expr::{CompareOp, Literal, SqlExpr};
pub use postgres::PostgreSqlBuilder;
pub use select::{SelectBuilder, SortDirection};
pub use sqlite::SqliteSqlBuilder;
