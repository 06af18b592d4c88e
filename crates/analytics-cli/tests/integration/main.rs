//! Integration tests for the dhis-analytics CLI with real databases.
//!
//! These tests are behind the `integration-tests` feature flag and won't run
//! with regular `cargo test`:
//! `cargo test -p dhis-analytics-cli --features integration-tests`

#![cfg(feature = "integration-tests")]

mod sqlite;

use std::process::{Command, Output};

/// Run the dhis-analytics CLI with the given arguments and return the output.
pub fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dhis-analytics"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute dhis-analytics CLI")
}

/// Run the dhis-analytics CLI and assert it succeeds.
pub fn run_cli_success(args: &[&str]) -> Output {
    let output = run_cli(args);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        panic!(
            "CLI failed with status {:?}\nstderr: {}\nstdout: {}",
            output.status.code(),
            stderr,
            stdout
        );
    }
    output
}

/// Parse the CLI output as JSON.
pub fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| {
        panic!(
            "Expected valid JSON output, but parsing failed: {}\nOutput was: {}",
            e, stdout
        )
    })
}
