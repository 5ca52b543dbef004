//! Integration tests for `list` and `verify` against a temporary registry.

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TWO_AGENTS: &str = "\
allocated:
  - name: scout
    variant: l1
    port: 19003
  - name: ops
    variant: l2
    port: 19004
    username: ops
    uid: 503
reserved: [18788, 19000]
next_available:
  l1: 19005
  l2: 19005
";

/// A command isolated in its own home, config, and registry.
fn agent_deploy(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("agent-deploy"));
    cmd.env("NO_COLOR", "1")
        .env("HOME", home)
        .env("AGENT_DEPLOY_CONFIG", home.join("config.yaml"))
        .env("AGENT_DEPLOY_REGISTRY", registry_path(home))
        .env_remove("RUST_LOG");
    cmd
}

fn registry_path(home: &Path) -> PathBuf {
    home.join("registry.yaml")
}

fn home_with_registry(content: &str) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(registry_path(dir.path()), content).expect("write registry");
    dir
}

#[test]
fn test_list_with_no_registry_shows_hint() {
    let dir = TempDir::new().expect("temp dir");
    agent_deploy(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No agents registered"));
}

#[test]
fn test_list_shows_entries_in_registration_order() {
    let dir = home_with_registry(TWO_AGENTS);
    let output = agent_deploy(dir.path())
        .arg("list")
        .output()
        .expect("runs");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let scout = stdout.find("scout").expect("scout listed");
    let ops = stdout.find("ops").expect("ops listed");
    assert!(scout < ops);
    assert!(stdout.contains("isolated-user"));
    assert!(stdout.contains("503"));
}

#[test]
fn test_list_json_uses_registry_tags() {
    let dir = home_with_registry(TWO_AGENTS);
    let output = agent_deploy(dir.path())
        .args(["list", "--json"])
        .output()
        .expect("runs");
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    let entries = v["allocations"].as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["variant"], "l1");
    assert_eq!(entries[1]["uid"], 503);
}

#[test]
fn test_registry_flag_overrides_env() {
    let dir = home_with_registry(TWO_AGENTS);
    let other = dir.path().join("other.yaml");
    agent_deploy(dir.path())
        .args(["list", "--registry"])
        .arg(&other)
        .assert()
        .success()
        .stdout(predicate::str::contains("No agents registered"));
}

#[test]
fn test_duplicate_ports_are_reported_as_corrupt() {
    let dir = home_with_registry(
        "allocated:\n  - {name: a, variant: l1, port: 19003}\n  - {name: b, variant: l1, port: 19003}\n",
    );
    agent_deploy(dir.path())
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("corrupt registry"));
}

#[test]
fn test_corrupt_registry_json_error_carries_code() {
    let dir = home_with_registry("allocated: [oops\n");
    let output = agent_deploy(dir.path())
        .args(["list", "--json"])
        .output()
        .expect("runs");
    assert_eq!(output.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["error"], true);
    assert_eq!(v["code"], "CONFIG");
}

#[test]
fn test_verify_unknown_agent_fails() {
    let dir = home_with_registry(TWO_AGENTS);
    agent_deploy(dir.path())
        .args(["verify", "ghost"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no registered agent named 'ghost'"));
}
