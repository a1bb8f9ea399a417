//! Focused CLI argument parsing tests.
//!
//! Every command runs against a temporary project directory so local
//! somig.toml files never leak into the results.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn somig() -> Command {
    Command::cargo_bin("somig").unwrap()
}

/// A project whose retries are fast enough for tests.
fn project(extra: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("somig.toml"),
        format!("[migration]\nretry_base_delay_ms = 1\n{extra}"),
    )
    .unwrap();
    temp
}

// ============================================================================
// Basic Commands
// ============================================================================

#[test]
fn version_command_succeeds() {
    somig()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("somig"));
}

#[test]
fn version_flag_shows_version() {
    somig()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("somig"));
}

#[test]
fn help_flag_shows_usage() {
    somig()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("saved-objects"));
}

#[test]
fn unknown_subcommand_fails() {
    somig().arg("frobnicate").assert().failure();
}

// ============================================================================
// Config Commands
// ============================================================================

#[test]
fn config_show_prints_defaults() {
    let temp = TempDir::new().unwrap();

    somig()
        .args(["config", "show", "--project", temp.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Batch size: 1000"))
        .stdout(predicate::str::contains("Parallelism: 4"));
}

#[test]
fn config_show_reads_project_file() {
    let temp = project("[coordinator]\nparallelism = 7\n");

    somig()
        .args(["config", "show", "--format", "toml", "--project"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("parallelism = 7"))
        .stdout(predicate::str::contains("retry_base_delay_ms = 1"));
}

#[test]
fn config_show_as_json() {
    let temp = TempDir::new().unwrap();

    somig()
        .args(["config", "show", "-f", "json", "-p"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"batch_size\": 1000"));
}

#[test]
fn config_show_rejects_unknown_format() {
    somig()
        .args(["config", "show", "--format", "yaml"])
        .assert()
        .failure();
}

#[test]
fn config_validate_rejects_zero_parallelism() {
    let temp = project("[coordinator]\nparallelism = 0\n");

    somig()
        .args(["config", "validate", "--project"])
        .arg(temp.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("parallelism"));
}

// ============================================================================
// Simulation
// ============================================================================

#[test]
fn simulate_migrates_generated_documents() {
    let temp = project("");

    somig()
        .args(["simulate", "--docs", "40", "--batch-size", "15", "--format", "json", "-p"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"done\""))
        .stdout(predicate::str::contains("\"docs_written\": 40"));
}

#[test]
fn simulate_legacy_indices() {
    let temp = project("");

    somig()
        .args(["simulate", "--legacy", "--docs", "10", "--prefix", ".kibana", "-p"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("10 documents written"));
}

#[test]
fn simulate_fails_over_transform_error_threshold() {
    let temp = project("transform_error_threshold = 0\n");

    somig()
        .args(["simulate", "--docs", "10", "--bad-docs", "2", "-p"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to transform"));
}

#[test]
fn simulate_rejects_invalid_fail_rate() {
    let temp = project("");

    somig()
        .args(["simulate", "--fail-rate", "2.0", "-p"])
        .arg(temp.path())
        .assert()
        .failure();
}
