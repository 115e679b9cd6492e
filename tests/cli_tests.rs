//! Integration tests for the ghgen CLI
//!
//! These tests run the actual binary against a temporary output directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/gh-gen.yml");

/// Get the binary to test
fn ghgen_cmd() -> Command {
    let mut cmd = Command::cargo_bin("ghgen").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

/// Binary configured with the repository config, writing into `dir`
fn ghgen_in(dir: &Path) -> Command {
    let mut cmd = ghgen_cmd();
    cmd.current_dir(dir)
        .args(["--config", CONFIG, "-D"])
        .arg(dir.join("workflows"));
    cmd
}

#[test]
fn test_help_flag() {
    ghgen_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Generate GitHub Actions workflows from Rust code",
        ))
        .stdout(predicate::str::contains("--check"))
        .stdout(predicate::str::contains("--output-directory"));
}

// ============================================================================
// Generation
// ============================================================================

#[test]
fn test_generate_all() {
    let temp_dir = TempDir::new().unwrap();

    ghgen_in(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 workflow(s) generated"));

    let check = fs::read_to_string(temp_dir.path().join("workflows/check.yml")).unwrap();
    assert!(check.starts_with("# generated from workflows.rs::check\nname: Check\n"));
    assert!(check.contains("      uses: actions/checkout@v4\n"));
    assert!(temp_dir.path().join("workflows/release.yml").exists());
    assert!(!temp_dir.path().join("workflows/check.yml.tmp").exists());
}

#[test]
fn test_generate_selected_workflow() {
    let temp_dir = TempDir::new().unwrap();

    ghgen_in(temp_dir.path())
        .arg("release")
        .assert()
        .success()
        .stdout(predicate::str::contains("release.yml"))
        .stdout(predicate::str::contains("1 workflow(s) generated"));

    assert!(temp_dir.path().join("workflows/release.yml").exists());
    assert!(!temp_dir.path().join("workflows/check.yml").exists());
}

#[test]
fn test_generate_is_stable() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("workflows/check.yml");

    ghgen_in(temp_dir.path()).arg("check").assert().success();
    let first = fs::read_to_string(&path).unwrap();
    ghgen_in(temp_dir.path()).arg("check").assert().success();
    assert_eq!(first, fs::read_to_string(&path).unwrap());
}

// ============================================================================
// Check mode
// ============================================================================

#[test]
fn test_check_up_to_date() {
    let temp_dir = TempDir::new().unwrap();
    ghgen_in(temp_dir.path()).assert().success();

    ghgen_in(temp_dir.path())
        .arg("--check")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 workflow(s) up to date"));
}

#[test]
fn test_check_out_of_date() {
    let temp_dir = TempDir::new().unwrap();
    ghgen_in(temp_dir.path()).assert().success();
    let path = temp_dir.path().join("workflows/check.yml");
    fs::write(&path, "stale\n").unwrap();

    ghgen_in(temp_dir.path())
        .arg("--check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("-stale"))
        .stdout(predicate::str::contains("+name: Check"))
        .stderr(predicate::str::contains("GHGEN-023"))
        .stderr(predicate::str::contains("1 of 2 workflow(s) failed"));

    // check mode never writes
    assert_eq!(fs::read_to_string(&path).unwrap(), "stale\n");
}

#[test]
fn test_check_missing_file() {
    let temp_dir = TempDir::new().unwrap();

    ghgen_in(temp_dir.path())
        .args(["--check", "check"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("+# generated from workflows.rs::check"));

    assert!(!temp_dir.path().join("workflows").exists());
}

// ============================================================================
// JSON output
// ============================================================================

#[test]
fn test_json_output() {
    let temp_dir = TempDir::new().unwrap();

    let output = ghgen_in(temp_dir.path())
        .args(["--json", "check"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let value: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(value["name"], "Check");
    assert_eq!(value["jobs"]["test"]["runs-on"], "${{ matrix.os }}");
    assert!(!temp_dir.path().join("workflows").exists());
}

#[test]
fn test_json_conflicts_with_check() {
    ghgen_cmd()
        .args(["--json", "--check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unknown_workflow() {
    let temp_dir = TempDir::new().unwrap();

    ghgen_in(temp_dir.path())
        .arg("nope")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("GHGEN-020"))
        .stderr(predicate::str::contains("available: check, release"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_invalid_workflow_id() {
    let temp_dir = TempDir::new().unwrap();

    ghgen_in(temp_dir.path())
        .arg("not an id")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("GHGEN-012"));
}

#[test]
fn test_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("gh-gen.yml");
    fs::write(&config, "output-dir: somewhere\n").unwrap();

    ghgen_cmd()
        .current_dir(temp_dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("GHGEN-010"))
        .stderr(predicate::str::contains("output-directory, trusted-owners and uses"));
}

#[test]
fn test_invalid_catalog_entry() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("custom.yml");
    fs::write(&config, "uses:\n  checkout: not-a-reference\n").unwrap();

    ghgen_cmd()
        .current_dir(temp_dir.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("GHGEN-011"));
}

#[test]
fn test_missing_config_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();

    ghgen_cmd()
        .current_dir(temp_dir.path())
        .arg("check")
        .assert()
        .success();

    let check = fs::read_to_string(temp_dir.path().join(".github/workflows/check.yml")).unwrap();
    // without a catalog the short names are kept as written
    assert!(check.contains("      uses: checkout\n"));
}
