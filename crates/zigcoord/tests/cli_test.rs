//! Integration tests for the `zigcoord` CLI binary.
//!
//! Every test runs against a temporary config whose profile drives the
//! built-in virtual radio, so no hardware or user configuration is touched.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

const LAMP: &str = "00:15:8d:00:00:00:00:01";

const TEST_CONFIG: &str = r#"
default_profile = "test"

[defaults]
output = "table"
timeout = 30

[profiles.test]
pan_id = 6754
channel = 15
startup_delay_ms = 0
browse_poll_ms = 10

[[profiles.test.virtual_radio.devices]]
address = "00:15:8d:00:00:00:00:01"
device_type = 257
manufacturer = "IKEA of Sweden"
model = "TRADFRI bulb E27"

[[profiles.test.virtual_radio.devices.clusters]]
id = 8

[[profiles.test.virtual_radio.devices.clusters.attributes]]
id = 0
name = "current_level"
value = 180
"#;

/// Build a [`Command`] for the `zigcoord` binary with env isolation.
///
/// Clears all `ZIGCOORD_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn zigcoord_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("zigcoord");
    cmd.env("HOME", "/tmp/zigcoord-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/zigcoord-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("ZIGCOORD_PROFILE")
        .env_remove("ZIGCOORD_CONFIG")
        .env_remove("ZIGCOORD_OUTPUT")
        .env_remove("ZIGCOORD_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// A temp dir holding the test config, kept alive alongside its path.
fn test_config() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, TEST_CONFIG).unwrap();
    (dir, path)
}

fn with_config(path: &Path) -> assert_cmd::Command {
    let mut cmd = zigcoord_cmd();
    cmd.arg("--config").arg(path);
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = zigcoord_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    zigcoord_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("coordinator")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("read"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    zigcoord_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("zigcoord"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    zigcoord_cmd().arg("frobnicate").assert().code(2);
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let (_dir, path) = test_config();
    with_config(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path.to_string_lossy().as_ref()));
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    with_config(&path).args(["config", "init"]).assert().success();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("IKEA of Sweden"), "demo profile missing:\n{written}");

    with_config(&path)
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));

    with_config(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_json() {
    let (_dir, path) = test_config();
    let output = with_config(&path)
        .args(["config", "show", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["default_profile"], "test");
    assert_eq!(shown["profiles"]["test"]["channel"], 15);
}

// ── Network commands ────────────────────────────────────────────────

#[test]
fn test_devices_plain_lists_addresses() {
    let (_dir, path) = test_config();
    with_config(&path)
        .args(["devices", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains(LAMP));
}

#[test]
fn test_devices_json_includes_description() {
    let (_dir, path) = test_config();
    with_config(&path)
        .args(["devices", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("IKEA of Sweden:TRADFRI bulb E27"));
}

#[test]
fn test_read_attribute_value() {
    let (_dir, path) = test_config();
    with_config(&path)
        .args(["read", LAMP, "0x0008", "0", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("180"));
}

#[test]
fn test_read_unknown_attribute_is_not_found() {
    let (_dir, path) = test_config();
    with_config(&path)
        .args(["read", LAMP, "0x0008", "7"])
        .assert()
        .code(4);
}

#[test]
fn test_read_rejects_bad_cluster() {
    let (_dir, path) = test_config();
    with_config(&path)
        .args(["read", LAMP, "level", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cluster"));
}

#[test]
fn test_unknown_profile_fails() {
    let (_dir, path) = test_config();
    let output = with_config(&path)
        .args(["--profile", "garage", "devices"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let text = combined_output(&output);
    assert!(text.contains("garage"), "Expected profile name in:\n{text}");
}

#[test]
fn test_channel_out_of_range_is_rejected() {
    let (_dir, path) = test_config();
    with_config(&path)
        .args(["--channel", "40", "devices"])
        .assert()
        .code(2);
}

#[test]
fn test_run_reaches_ready() {
    let (_dir, path) = test_config();
    with_config(&path)
        .args(["run", "--duration", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("network ready"));
}
