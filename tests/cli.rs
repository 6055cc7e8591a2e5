use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn cli_shows_help() {
    let mut cmd = Command::cargo_bin("countries").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn status_on_fresh_data_file_reports_no_refresh() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("countries").unwrap();
    cmd.arg("--data-file")
        .arg(dir.path().join("countries.json"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .arg("status");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"total_countries\": 0"))
        .stdout(predicate::str::contains("No refresh yet"));
}

#[test]
fn missing_country_exits_with_not_found_body() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("countries").unwrap();
    cmd.arg("--data-file")
        .arg(dir.path().join("countries.json"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .args(["get", "Atlantis"]);
    cmd.assert()
        .code(4)
        .stderr(predicate::str::contains("{\"error\":\"Country not found\"}"));
}

#[test]
fn summary_before_refresh_is_not_found() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("countries").unwrap();
    cmd.arg("--data-file")
        .arg(dir.path().join("countries.json"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .args(["summary", "--out"])
        .arg(dir.path().join("out.svg"));
    cmd.assert()
        .code(4)
        .stderr(predicate::str::contains("Summary image not found"));
}

#[test]
fn export_failure_is_reported_as_export() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("countries").unwrap();
    cmd.arg("--data-file")
        .arg(dir.path().join("countries.json"))
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .args(["export", "--out"])
        .arg(dir.path().join("missing").join("countries.csv"));
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("{\"error\":\"Failed to export countries\"}"));
}

#[test]
fn corrupt_data_file_is_named_in_the_error() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("countries.json");
    std::fs::write(&data, "{not json").unwrap();
    let mut cmd = Command::cargo_bin("countries").unwrap();
    cmd.arg("--data-file")
        .arg(&data)
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .arg("status");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("countries.json"));
}
