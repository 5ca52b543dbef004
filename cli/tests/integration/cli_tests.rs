//! Integration tests for argument parsing, help, and version output.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn agent_deploy() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("agent-deploy"));
    cmd.env("NO_COLOR", "1");
    cmd
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    agent_deploy().assert().code(2).stderr(predicate::str::contains(
        "Provision isolated agent gateways",
    ));
}

#[test]
fn test_help_lists_every_command() {
    agent_deploy()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("version"));
}

#[test]
fn test_deploy_help_lists_variant_values() {
    agent_deploy()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shared-profile"))
        .stdout(predicate::str::contains("isolated-user"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--rollback"));
}

#[test]
fn test_version_command_shows_version() {
    agent_deploy()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "agent-deploy {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let output = agent_deploy()
        .args(["version", "--json"])
        .output()
        .expect("runs");
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_no_color_env_accepts_any_value() {
    for value in ["1", "true", ""] {
        Command::new(assert_cmd::cargo::cargo_bin!("agent-deploy"))
            .env("NO_COLOR", value)
            .args(["version", "--no-color"])
            .assert()
            .success()
            .stdout(predicate::str::contains("agent-deploy"));
    }
}

// --- Usage errors ---

#[test]
fn test_unknown_variant_is_a_usage_error() {
    agent_deploy()
        .args(["deploy", "--variant", "l3", "--name", "scout"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid value 'l3'"));
}

#[test]
fn test_deploy_requires_a_name() {
    agent_deploy()
        .args(["deploy", "--variant", "shared-profile"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--name"));
}

#[test]
fn test_dry_run_and_rollback_conflict() {
    agent_deploy()
        .args([
            "deploy",
            "--variant",
            "l1",
            "--name",
            "scout",
            "--dry-run",
            "--rollback",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_port_must_be_a_port_number() {
    agent_deploy()
        .args([
            "deploy",
            "--variant",
            "l1",
            "--name",
            "scout",
            "--port",
            "70000",
        ])
        .assert()
        .code(2);
}
