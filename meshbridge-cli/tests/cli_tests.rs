//! End-to-end tests for the meshbridge binary
//!
//! Every run passes `--log-level error` so stdout carries only command output.

use std::process::{Command, Output};
use tempfile::TempDir;

fn meshbridge(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_meshbridge"))
        .args(["--log-level", "error"])
        .args(args)
        .env_remove("MESHBRIDGE_MEDIATOR_LOST_PEER_POLICY")
        .env_remove("MESHBRIDGE_LOG_LEVEL")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run meshbridge")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_show_config_prints_defaults() {
    let output = meshbridge(&["show-config"]);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("[mediator]"));
    assert!(text.contains("lost_peer_policy = \"retain_channel\""));
    assert!(text.contains("[logging]"));
}

#[test]
fn test_show_config_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bridge.toml");
    std::fs::write(
        &path,
        "[mediator]\nlocal_identity = \"kiosk-7\"\nlost_peer_policy = \"tear_down\"\nprovisioning_timeout = \"30s\"\n",
    )
    .unwrap();

    let output = meshbridge(&["--config", path.to_str().unwrap(), "show-config"]);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("local_identity = \"kiosk-7\""));
    assert!(text.contains("lost_peer_policy = \"tear_down\""));
    assert!(text.contains("provisioning_timeout = \"30s\""));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let output = meshbridge(&["--config", path.to_str().unwrap(), "show-config"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read configuration file"));
    assert!(stderr.contains("absent.toml"));
}

#[test]
fn test_invalid_log_level_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_meshbridge"))
        .args(["--log-level", "loud", "show-config"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_env_override_is_applied() {
    let output = Command::new(env!("CARGO_BIN_EXE_meshbridge"))
        .args(["--log-level", "error", "show-config"])
        .env("MESHBRIDGE_MEDIATOR_LOST_PEER_POLICY", "teardown")
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("lost_peer_policy = \"tear_down\""));
}

#[test]
fn test_simulate_prints_every_notification() {
    let output = meshbridge(&["simulate", "--peers", "2", "--messages", "2"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let text = stdout(&output);
    let count = |kind: &str| text.lines().filter(|l| l.starts_with(&format!("[{}]", kind))).count();
    assert_eq!(count("peer_joined_channel"), 2);
    assert_eq!(count("message_sent"), 4);
    assert_eq!(count("message_received"), 2);
    assert_eq!(count("instance_lost"), 1);
}

#[test]
fn test_simulate_json_output() {
    let output = meshbridge(&["simulate", "--peers", "1", "--json"]);
    assert!(output.status.success());

    let kinds: Vec<String> = stdout(&output)
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["kind"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["peer_joined_channel", "message_sent", "message_received", "instance_lost"]
    );
}
