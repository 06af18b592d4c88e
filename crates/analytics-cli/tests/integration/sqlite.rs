//! SQLite integration tests for the dhis-analytics CLI.
//!
//! These tests create temporary SQLite databases and run table replication and
//! analytics table generation against them.

use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

use crate::{run_cli_success, stdout_json};

fn create_source_tables(path: &Path) {
    let conn = Connection::open(path).expect("open sqlite db");

    conn.execute_batch(
        r#"
        CREATE TABLE relationship (
            relationshipid INTEGER PRIMARY KEY,
            relationshiptypeid INTEGER NOT NULL,
            lastupdated TEXT NOT NULL
        );
        INSERT INTO relationship VALUES (1, 10, '2024-01-02 10:00:00');
        INSERT INTO relationship VALUES (2, 10, '2024-02-02 10:00:00');
        INSERT INTO relationship VALUES (3, 11, '2024-03-02 10:00:00');

        CREATE TABLE event (
            uid TEXT NOT NULL,
            occurreddate TEXT NOT NULL,
            lastupdated TEXT NOT NULL,
            value INTEGER
        );
        INSERT INTO event VALUES ('aaaaaaaaaa1', '2022-05-01', '2022-05-01 08:00:00', 3);
        INSERT INTO event VALUES ('aaaaaaaaaa2', '2023-05-01', '2023-05-01 08:00:00', 4);
        INSERT INTO event VALUES ('aaaaaaaaaa3', '2023-06-01', '2023-06-01 08:00:00', 5);
        "#,
    )
    .expect("create source tables");
}

const CONFIG: &str = r#"
[analytics]
dialect = "sqlite"
parallel_jobs = 1

[[tables]]
table_type = "EVENT"
name = "analytics_event"
from_clause = "event"
year_expression = "cast(strftime('%Y', occurreddate) as integer)"
updated_expression = "lastupdated"
key_columns = ["event"]

[[tables.columns]]
name = "event"
data_type = "character_11"
nullable = false
select = "uid"
indexed = true

[[tables.columns]]
name = "year"
data_type = "integer"
select = "cast(strftime('%Y', occurreddate) as integer)"

[[tables.columns]]
name = "value"
data_type = "integer"
select = "value"

[[replicate]]
name = "analytics_rs_relationship"
source = "relationship"
primary_key = ["relationshipid"]
columns = [
    { name = "relationshipid", data_type = "bigint", nullable = false },
    { name = "relationshiptypeid", data_type = "bigint", nullable = false },
    { name = "lastupdated", data_type = "timestamp" },
]
"#;

fn count(path: &Path, table: &str) -> i64 {
    let conn = Connection::open(path).expect("open sqlite db");
    conn.query_row(&format!("SELECT count(*) FROM \"{table}\""), [], |row| row.get(0))
        .expect("count rows")
}

fn table_names(path: &Path) -> Vec<String> {
    let conn = Connection::open(path).expect("open sqlite db");
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .expect("prepare");
    stmt.query_map([], |row| row.get(0))
        .expect("query tables")
        .collect::<Result<Vec<String>, _>>()
        .expect("read names")
}

#[test]
fn test_sqlite_replicate_table() {
    let dir = tempdir().expect("create temp dir");
    let db_path = dir.path().join("dhis.db");
    let config_path = dir.path().join("dhis-analytics.toml");
    create_source_tables(&db_path);
    fs::write(&config_path, CONFIG).expect("write config");

    let url = format!("sqlite://{}", db_path.display());
    let output = run_cli_success(&[
        "replicate",
        "-c",
        config_path.to_str().unwrap(),
        "--database-url",
        &url,
        "-f",
        "json",
    ]);

    let json = stdout_json(&output);
    assert_eq!(json[0]["table"], "analytics_rs_relationship");
    assert_eq!(count(&db_path, "analytics_rs_relationship"), 3);
    assert!(!table_names(&db_path)
        .iter()
        .any(|name| name.ends_with("_staging")));
}

#[test]
fn test_sqlite_replicate_twice_replaces_contents() {
    let dir = tempdir().expect("create temp dir");
    let db_path = dir.path().join("dhis.db");
    let config_path = dir.path().join("dhis-analytics.toml");
    create_source_tables(&db_path);
    fs::write(&config_path, CONFIG).expect("write config");
    let url = format!("sqlite://{}", db_path.display());
    let args = [
        "replicate",
        "-c",
        config_path.to_str().unwrap(),
        "--database-url",
        &url,
    ];

    run_cli_success(&args);
    Connection::open(&db_path)
        .expect("open sqlite db")
        .execute("DELETE FROM relationship WHERE relationshipid = 3", [])
        .expect("delete source row");
    run_cli_success(&args);

    assert_eq!(count(&db_path, "analytics_rs_relationship"), 2);
}

#[test]
fn test_sqlite_generate_full_update() {
    let dir = tempdir().expect("create temp dir");
    let db_path = dir.path().join("dhis.db");
    let config_path = dir.path().join("dhis-analytics.toml");
    create_source_tables(&db_path);
    fs::write(&config_path, CONFIG).expect("write config");

    let url = format!("sqlite://{}", db_path.display());
    let output = run_cli_success(&[
        "generate",
        "-c",
        config_path.to_str().unwrap(),
        "--database-url",
        &url,
        "-f",
        "json",
    ]);

    let json = stdout_json(&output);
    assert_eq!(json["tables"][0]["table"], "analytics_event");
    assert_eq!(json["tables"][0]["partitions"].as_array().unwrap().len(), 2);
    assert_eq!(count(&db_path, "analytics_event"), 3);
    assert!(!table_names(&db_path)
        .iter()
        .any(|name| name.ends_with("_staging")));
}
