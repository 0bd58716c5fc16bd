//! CLI parsing tests for the include-gardener command
//!
//! Tests that verify argument parsing and the fatal configuration errors
//! raised before any scan starts.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the include-gardener binary, isolated from any user config
#[allow(deprecated)]
fn gardener(home: &TempDir) -> Command {
    let mut cmd =
        Command::cargo_bin("include-gardener").expect("Failed to find include-gardener binary");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"));
    cmd
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_lists_options() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--include-path"))
        .stdout(predicate::str::contains("--process-path"))
        .stdout(predicate::str::contains("--exclude"))
        .stdout(predicate::str::contains("--recursive-limit"))
        .stdout(predicate::str::contains("--threads"))
        .stdout(predicate::str::contains("--language"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--out-file"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("include-gardener"));

    gardener(&home)
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// Fatal Configuration Errors
// ============================================================================

#[test]
fn test_missing_process_path() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No input provided"));
}

#[test]
fn test_unsupported_language() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .args(["-l", "COBOL", "."])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error: Language cobol not supported."));
}

#[test]
fn test_language_is_case_insensitive() {
    let home = TempDir::new().unwrap();
    gardener(&home).args(["-l", "Python", "."]).assert().success();
}

#[test]
fn test_zero_threads_rejected() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .args(["-j", "0", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one worker thread"));
}

#[test]
fn test_unknown_format_rejected() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .args(["-f", "svg", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("svg"));
}

#[test]
fn test_xml_format_alias() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .args(["-f", "xml", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("<graphml"));
}

#[test]
fn test_missing_config_file() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .args(["-c", "does-not-exist.toml", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.toml"));
}

#[test]
fn test_invalid_exclude_pattern() {
    let home = TempDir::new().unwrap();
    gardener(&home)
        .args(["-e", "(unclosed", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("(unclosed"));
}

#[test]
fn test_negative_recursive_limit_accepted() {
    let home = TempDir::new().unwrap();
    gardener(&home).args(["-L", "-1", "."]).assert().success();
}
