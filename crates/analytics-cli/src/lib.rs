//! DHIS2 analytics CLI library.
//!
//! This module exposes internal types for testing purposes.
//! The main entry point is the `dhis-analytics` binary.

pub mod cli;
pub mod config;
pub mod db;
pub mod input;
pub mod logging;
pub mod output;
pub mod watermark;

// Re-export commonly used types
pub use cli::Args;
pub use config::AppConfig;
