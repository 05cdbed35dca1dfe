//! Integration tests for the `launcher-control` binary

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli() -> assert_cmd::Command {
    cargo_bin_cmd!("launcher-control")
}

#[test]
fn cli_without_arguments_prints_usage() {
    cli()
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn cli_help_flag_exits_with_failure() {
    cli()
        .arg("-h")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("turn left"));
}

#[test]
fn cli_unknown_flag_prints_usage() {
    cli()
        .arg("-x")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn cli_stop_writes_two_stop_bytes() {
    let dir = TempDir::new().unwrap();
    let node = dir.path().join("launcher0");
    std::fs::write(&node, b"").unwrap();

    cli()
        .arg("-m")
        .arg(&node)
        .args(["-s", "-t", "0"])
        .assert()
        .success();

    assert_eq!(std::fs::read(&node).unwrap(), vec![0x20, 0x20]);
}

#[test]
fn cli_direction_then_stop() {
    let dir = TempDir::new().unwrap();
    let node = dir.path().join("launcher0");
    std::fs::write(&node, b"").unwrap();

    cli()
        .arg("-m")
        .arg(&node)
        .args(["-lu", "-t", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Duration set to 10"));

    assert_eq!(std::fs::read(&node).unwrap(), vec![0x06, 0x20]);
}

#[test]
fn cli_missing_node_fails() {
    let dir = TempDir::new().unwrap();

    cli()
        .arg("-m")
        .arg(dir.path().join("absent"))
        .arg("-f")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Couldn't open"));
}

#[test]
fn cli_last_mnemonic_wins() {
    let dir = TempDir::new().unwrap();
    let node = dir.path().join("launcher0");
    std::fs::write(&node, b"").unwrap();

    cli()
        .arg("-m")
        .arg(&node)
        .args(["-f", "-s", "-t", "0"])
        .assert()
        .success();

    assert_eq!(std::fs::read(&node).unwrap(), vec![0x20, 0x20]);
}
