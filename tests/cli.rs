//! Integration tests for CLI commands

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_review_command_help() {
    let mut cmd = Command::cargo_bin("revq").unwrap();
    cmd.arg("review").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Review a pull request"));
}

#[test]
fn test_config_path_prints_a_toml_path() {
    let mut cmd = Command::cargo_bin("revq").unwrap();
    cmd.arg("config-path");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_review_without_repository_fails_with_guidance() {
    let mut cmd = Command::cargo_bin("revq").unwrap();
    cmd.arg("review")
        .arg("1")
        .arg("--owner")
        .arg("acme")
        .env("GITHUB_TOKEN", "test-token")
        .env("OPENAI_API_KEY", "test-key")
        // Isolate from any developer config file.
        .env("XDG_CONFIG_HOME", std::env::temp_dir().join("revq-cli-test"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--repo"));
}
