//! CLI integration tests for oe-sqlite-mirror.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the oe-sqlite-mirror binary.
fn cmd() -> Command {
    Command::cargo_bin("oe-sqlite-mirror").unwrap()
}

/// Write a syntactically valid configuration pointing into `dir`.
fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
    let config = format!(
        r#"{{
  "progress_db": {{
    "host": "localhost",
    "port": 9000,
    "db_name": "sports",
    "user": "sysprogress",
    "password": "x",
    "driver_class": "com.ddtek.jdbc.openedge.OpenEdgeDriver",
    "jar_file": "openedge.jar"
  }},
  "sqlite_db": {{ "db_path": "{}" }},
  "mirror_settings": {{
    "batch_size": 100,
    "log_file": "{}",
    "ignore_file": "{}"
  }}
}}"#,
        path("analytics.db"),
        path("mirror.log"),
        path("ignore.txt")
    );
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, config).unwrap();
    config_path
}

#[test]
fn test_help_shows_all_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--full-sync"))
        .stdout(predicate::str::contains("--ignore-table"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--verbosity"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("oe-sqlite-mirror"));
}

#[test]
fn test_unknown_flag_fails() {
    cmd().arg("--no-such-flag").assert().failure();
}

#[test]
fn test_missing_config_file_exits_with_error() {
    cmd()
        .args(["--config", "/nonexistent/config.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_json_config_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, "{ not json").unwrap();

    cmd()
        .args(["--config", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_batch_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir);
    let content = std::fs::read_to_string(&config_path)
        .unwrap()
        .replace("\"batch_size\": 100", "\"batch_size\": 0");
    std::fs::write(&config_path, content).unwrap();

    cmd()
        .args(["--config", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("batch_size"));
}

#[cfg(not(feature = "odbc"))]
#[test]
fn test_run_without_odbc_feature_explains_rebuild() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir);

    cmd()
        .args(["--config", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("odbc"));
}
