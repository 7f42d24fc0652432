//! CLI integration tests
//!
//! Tests the botfleet CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

fn botfleet() -> Command {
    let mut cmd = Command::cargo_bin("botfleet")
        .expect("Failed to locate botfleet binary - ensure it's built before running tests");
    cmd.env_remove("BOTFLEET_SERVER")
        .env_remove("ORCHESTRATOR_AUTH_TOKEN")
        .env_remove("BOTFLEET_BOT_TOKEN");
    cmd
}

/// An address nothing listens on
fn dead_server() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[test]
fn test_cli_help() {
    botfleet()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("botfleet"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn test_cli_version() {
    botfleet()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("botfleet"));
}

#[test]
fn test_add_requires_token() {
    botfleet()
        .args(["add", "--replica-id", "r-1", "--owner-id", "o-1", "--server", &dead_server()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--token-stdin"))
        .stderr(predicate::str::contains("BOTFLEET_BOT_TOKEN"));
}

#[test]
fn test_add_rejects_token_argument() {
    botfleet()
        .args(["add", "--replica-id", "r-1", "--owner-id", "o-1", "--token", "s3cret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_add_reads_token_from_stdin() {
    botfleet()
        .args(["add", "--replica-id", "r-1", "--owner-id", "o-1", "--token-stdin"])
        .args(["--server", &dead_server()])
        .write_stdin("s3cret\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Is it running?"));
}

#[test]
fn test_add_reads_token_from_env() {
    botfleet()
        .args(["add", "--replica-id", "r-1", "--owner-id", "o-1"])
        .args(["--server", &dead_server()])
        .env("BOTFLEET_BOT_TOKEN", "s3cret")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Is it running?"));
}

#[test]
fn test_status_unreachable_server() {
    botfleet()
        .args(["status", "--server", &dead_server()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Is it running?"));
}

#[test]
fn test_empty_update_is_rejected() {
    botfleet()
        .args(["update", "r-1", "--server", &dead_server()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to update"));
}
