use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_help() {
    let mut cmd = Command::new(cargo_bin!("orderflow"));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--address"))
        .stdout(predicate::str::contains("Bind address override"));
}

#[test]
fn test_cli_rejects_unknown_flag() {
    let mut cmd = Command::new(cargo_bin!("orderflow"));
    cmd.arg("--definitely-not-a-flag");

    cmd.assert().failure();
}
