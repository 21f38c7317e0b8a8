//! CLI integration tests

use std::process::Command;

fn gcp_exporter() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_gcp-exporter"));
    command.env_remove("DEBUG").env_remove("NO_COLOR");
    command
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = gcp_exporter()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("start"), "Should show start command");
    assert!(stdout.contains("get-token"), "Should show get-token command");
    assert!(stdout.contains("--log-format"), "Should show global flags");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = gcp_exporter()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("gcp-exporter"), "Should show binary name");
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "Should show version");
}

/// Test that collector options are added to the start command
#[test]
fn test_start_help_lists_collector_options() {
    let output = gcp_exporter()
        .args(["start", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "start help should succeed");
    for flag in [
        "--listen",
        "--interval",
        "--service-account-file",
        "--config",
        "--project",
        "--zone",
        "--match-tag",
        "--instances-collector-enable",
        "--regions-collector-enable",
    ] {
        assert!(stdout.contains(flag), "Should show {flag}");
    }
    assert!(stdout.contains("GCP_EXPORTER_MATCH_TAG"), "Should show env var");
    assert!(stdout.contains("INSTANCES_COLLECTOR_ENABLE"), "Should show env var");
}

/// Test that a missing service account file fails startup
#[test]
fn test_start_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = gcp_exporter()
        .args(["start", "--service-account-file"])
        .arg(dir.path().join("missing.json"))
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "start should fail");
    assert!(stderr.contains("could not prepare GCP client"), "{stderr}");
}

/// Test that get-token reports a missing service account file
#[test]
fn test_get_token_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = gcp_exporter()
        .args(["get-token", "--service-account-file"])
        .arg(dir.path().join("missing.json"))
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "get-token should fail");
    assert!(stderr.contains("doesn't exist"), "{stderr}");
}
