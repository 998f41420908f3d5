//! Integration tests for the grid CLI binary.
//!
//! These tests exercise the compiled binary using assert_cmd. None of them
//! reach a server: the API base URL points at a closed local port and every
//! command under test fails or succeeds before contacting it.

use assert_cmd::Command;
use grid_test_utils::TestWorkspace;
use predicates::prelude::*;

/// A `grid` command isolated from the user's config and environment.
fn grid_cmd(ws: &TestWorkspace) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("grid"));
    cmd.current_dir(ws.root())
        .env("GRID_CONFIG_DIR", ws.config_dir())
        .env("GRID_API_BASE_URL", "http://127.0.0.1:9/api")
        .env_remove("GRID_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let ws = TestWorkspace::new();
    grid_cmd(&ws)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("publish-release"));
}

#[test]
fn test_version_output() {
    let ws = TestWorkspace::new();
    grid_cmd(&ws)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("grid"));
}

#[test]
fn test_no_command_shows_help_hint() {
    let ws = TestWorkspace::new();
    grid_cmd(&ws)
        .assert()
        .success()
        .stdout(predicate::str::contains("grid --help"));
}

#[test]
fn test_completions_generate() {
    let ws = TestWorkspace::new();
    grid_cmd(&ws)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("grid"));
}

// ============================================================================
// Status Tests
// ============================================================================

#[test]
fn test_status_of_unbound_workspace() {
    let ws = TestWorkspace::new();
    ws.write("notes/today.md", "hello");

    grid_cmd(&ws)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not bound"))
        .stdout(predicate::str::contains("notes/today.md"));
}

#[test]
fn test_status_json() {
    let ws = TestWorkspace::new();
    ws.write("a.md", "x");

    let output = grid_cmd(&ws).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value["workspace"].is_null());
    assert_eq!(value["pending"][0]["path"], "a.md");
    assert_eq!(value["pending"][0]["kind"], "created");
}

#[test]
fn test_status_from_subdirectory_finds_root() {
    let ws = TestWorkspace::new();
    ws.write(".grid/config.toml", "")
        .write("docs/guide.md", "guide");

    grid_cmd(&ws)
        .current_dir(ws.root().join("docs"))
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("docs/guide.md"));
}

// ============================================================================
// Account Tests
// ============================================================================

#[test]
fn test_whoami_without_login() {
    let ws = TestWorkspace::new();
    grid_cmd(&ws)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in"));
}

#[test]
fn test_sync_without_login() {
    let ws = TestWorkspace::new();
    grid_cmd(&ws)
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in"));
}

#[test]
fn test_login_rejects_malformed_key() {
    let ws = TestWorkspace::new();
    grid_cmd(&ws)
        .args(["login", "--api-key", "sk-live-123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid API key"));

    assert!(!ws.config_dir().join("credentials").exists());
}

#[test]
fn test_logout_when_logged_out() {
    let ws = TestWorkspace::new();
    grid_cmd(&ws)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));
}

#[test]
fn test_unreachable_server_is_reported() {
    let ws = TestWorkspace::new();
    std::fs::write(ws.config_dir().join("credentials"), "grid_stored_key").unwrap();

    grid_cmd(&ws)
        .args(["workspaces", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Network error"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_show_merges_layers() {
    let ws = TestWorkspace::new();
    ws.write_global_config("max_attempts = 7\n");
    ws.write_workspace_config("sync_interval_secs = 42\n");

    grid_cmd(&ws)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sync_interval_secs = 42"))
        .stdout(predicate::str::contains("max_attempts = 7"))
        .stdout(predicate::str::contains("http://127.0.0.1:9/api"));
}

#[test]
fn test_invalid_config_fails() {
    let ws = TestWorkspace::new();
    ws.write_workspace_config("sync_interval_secs = 0\n");

    grid_cmd(&ws)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sync_interval_secs"));
}

// ============================================================================
// Release Tests
// ============================================================================

#[test]
fn test_publish_requires_secret() {
    let ws = TestWorkspace::new();
    ws.write("grid-setup.exe", "binary");

    grid_cmd(&ws)
        .env_remove("GRID_API_SECRET")
        .args(["publish-release", "1.0.0", "grid-setup.exe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GRID_API_SECRET"));
}

#[test]
fn test_publish_missing_artifact() {
    let ws = TestWorkspace::new();

    grid_cmd(&ws)
        .env("GRID_API_SECRET", "s3cret")
        .env("GRID_API_URL", "http://127.0.0.1:9/releases")
        .args(["publish-release", "1.0.0", "missing.exe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}
