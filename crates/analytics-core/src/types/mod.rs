//! Shared types for the analytics engine.
//!
//! Request-style types (dialects, identifiers, cancellation) live here; module-specific
//! types live next to the code that owns them.

mod common;
mod request;

pub use common::{issue_codes, CancellationToken, Issue, Severity};
pub use request::{Dialect, Uid};
