//! Integration tests driving the compiled `fleetctl` binary end to end.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("fleetctl").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("infra"))
        .stdout(predicate::str::contains("model"));
}

#[test]
fn missing_subcommand_prints_usage_and_fails() {
    let mut cmd = Command::cargo_bin("fleetctl").unwrap();
    cmd.assert().failure();
}

#[test]
fn apply_without_api_key_fails_before_touching_the_network() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("llms.yaml"),
        "models:\n  llama:\n    model: llama3-8b:q4_k_m\n    priority: high\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("fleetctl").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("VAST_API_KEY")
        .env_remove("HOME")
        .arg("apply");
    cmd.assert().failure();
}

#[test]
fn run_rejects_unknown_model_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("fleetctl").unwrap();
    cmd.current_dir(dir.path())
        .env("VAST_API_KEY", "test-key")
        .args(["run", "totally-unknown-family:q4_k_m"]);
    cmd.assert().failure();
}
