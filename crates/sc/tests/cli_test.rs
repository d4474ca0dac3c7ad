#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn sc() -> Command {
    Command::cargo_bin("sc").unwrap()
}

/// Writes a child stack whose client.yaml points at a parent
fn project_with_child() -> TempDir {
    let temp = TempDir::new().unwrap();
    let stack_dir = temp.path().join(".sc/stacks/orders");
    fs::create_dir_all(&stack_dir).unwrap();
    fs::write(
        stack_dir.join("client.yaml"),
        "schemaVersion: \"1.0\"\nstacks:\n  prod:\n    type: single-image\n    parent: acme/infra\n    config:\n      image: orders:1.0\n      port: 8080\n",
    )
    .unwrap();
    temp
}

#[test]
fn test_cli_help() {
    sc().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("outputs"));
}

#[test]
fn test_cli_version() {
    sc().arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sc "));
}

#[test]
fn test_deploy_help() {
    sc().args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--env"))
        .stdout(predicate::str::contains("--parent"));
}

#[test]
fn test_deploy_requires_env() {
    sc().args(["deploy", "--stack", "orders"])
        .env_remove("SC_ENV")
        .assert()
        .failure();
}

#[test]
fn test_provision_without_stacks_fails() {
    let temp = TempDir::new().unwrap();
    sc().arg("--root")
        .arg(temp.path())
        .arg("provision")
        .assert()
        .failure();
}

#[test]
fn test_deploy_missing_parent_fails() {
    let temp = project_with_child();
    sc().arg("--root")
        .arg(temp.path())
        .args(["deploy", "--stack", "orders", "--env", "prod"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("infra"));
}

#[test]
fn test_deploy_unknown_environment_fails() {
    let temp = project_with_child();
    sc().arg("--root")
        .arg(temp.path())
        .args(["deploy", "--stack", "orders", "--env", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn test_destroy_asks_for_confirmation() {
    let temp = project_with_child();
    sc().arg("--root")
        .arg(temp.path())
        .args(["destroy", "--stack", "orders", "--env", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));
}

#[test]
fn test_deploy_stops_when_decrypt_command_fails() {
    let temp = project_with_child();
    sc().arg("--root")
        .arg(temp.path())
        .args(["--decrypt-command", "echo wrong key >&2; exit 1"])
        .args(["deploy", "--stack", "orders", "--env", "prod"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to decrypt secrets"))
        .stderr(predicate::str::contains("wrong key"));
}
