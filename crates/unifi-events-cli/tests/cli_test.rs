//! Integration tests for the `unifi-events` CLI binary.
//!
//! Argument parsing, help output, completions, config resolution errors,
//! and REST round-trips against a mock controller.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `unifi-events` binary with env isolation.
///
/// Clears all `UNIFI_EVENTS_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("unifi-events");
    cmd.env("HOME", "/tmp/unifi-events-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/unifi-events-test-nonexistent")
        .env_remove("RUST_LOG");
    for var in [
        "PROFILE", "CONFIG", "HOST", "PORT", "SITE", "USERNAME", "PASSWORD", "UNIFI_OS",
        "INSECURE", "TIMEOUT", "OUTPUT",
    ] {
        cmd.env_remove(format!("UNIFI_EVENTS_{var}"));
    }
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Config file with one `lab` profile pointing at the mock controller.
fn write_config(dir: &Path, server: &MockServer) -> std::path::PathBuf {
    let addr = server.address();
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        format!(
            r#"default_profile = "lab"

[profiles.lab]
host = "{}"
port = {}
scheme = "http"
username = "admin"
password = "hunter2"
"#,
            addr.ip(),
            addr.port()
        ),
    )
    .unwrap();
    path
}

async fn mount_live_session(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/self"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn run(cmd: assert_cmd::Command) -> std::process::Output {
    let mut cmd = cmd;
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = cli_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    cli_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("UniFi controller")
            .and(predicate::str::contains("listen"))
            .and(predicate::str::contains("get"))
            .and(predicate::str::contains("post")),
    );
}

#[test]
fn test_version_flag() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("unifi-events"));
}

#[test]
fn test_listen_help_mentions_wildcards() {
    cli_cmd()
        .args(["listen", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("**").and(predicate::str::contains("--no-lifecycle")));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    cli_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    cli_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = cli_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success(), "Expected failure for invalid subcommand");
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_get_without_controller() {
    cli_cmd()
        .args(["get", "stat/device"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No controller configured"));
}

#[test]
fn test_missing_password_is_auth_exit_code() {
    cli_cmd()
        .args(["--host", "127.0.0.1", "get", "stat/device"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No password"));
}

#[test]
fn test_invalid_body_is_rejected_before_sending() {
    cli_cmd()
        .env("UNIFI_EVENTS_PASSWORD", "pw")
        .args(["--host", "127.0.0.1", "--port", "1", "post", "cmd/stamgr", "--data", "{nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid JSON"));
}

#[test]
fn test_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[profiles.home]\nhost = \"10.0.0.1\"\n").unwrap();

    cli_cmd()
        .arg("--config")
        .arg(&path)
        .args(["--profile", "office", "get", "stat/device"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("office").and(predicate::str::contains("home")));
}

#[test]
fn test_invalid_output_format() {
    let output = cli_cmd()
        .args(["--output", "yaml", "get", "stat/device"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("possible values") || text.contains("invalid value"),
        "Expected error about valid output formats:\n{text}"
    );
}

// ── Against a mock controller ───────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_get_prints_response_as_json_line() {
    let server = MockServer::start().await;
    mount_live_session(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/s/default/stat/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "rc": "ok" },
            "data": [{ "subsystem": "wlan" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server);

    let mut cmd = cli_cmd();
    cmd.arg("--config").arg(&config).args(["get", "stat/health"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1, "expected one JSON line:\n{stdout}");
    let printed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        printed,
        json!({ "meta": { "rc": "ok" }, "data": [{ "subsystem": "wlan" }] })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_not_found_maps_to_exit_code() {
    let server = MockServer::start().await;
    mount_live_session(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/api/s/default/rest/user/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("api.err.NotFound"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server);

    let mut cmd = cli_cmd();
    cmd.arg("--config")
        .arg(&config)
        .args(["delete", "rest/user/missing"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(4), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("api.err.NotFound"));
}
