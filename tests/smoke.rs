//! Smoke tests -- verify the binary runs and key modules load.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("boostd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Scheduled auto-renewal daemon"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("boostd")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("boostd"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("boostd")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_account_add_subcommand_exists() {
    Command::cargo_bin("boostd")
        .unwrap()
        .args(["account", "add", "--help"])
        .assert()
        .success();
}

#[test]
fn test_sample_intervals_respects_bound() {
    Command::cargo_bin("boostd")
        .unwrap()
        .args(["sample-intervals", "--count", "5"])
        .assert()
        .success()
        .stdout(predicates::str::contains("bound 13-17 min"));
}

#[test]
fn test_account_list_on_fresh_database() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("smoke.db");

    Command::cargo_bin("boostd")
        .unwrap()
        .args(["account", "list", "--owner", "1", "--db", db.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicates::str::contains("No accounts found"));
}

#[test]
fn test_owner_then_account_registration_flow() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("smoke.db");
    let db = db.to_str().unwrap();

    Command::cargo_bin("boostd")
        .unwrap()
        .args(["owner", "add", "--id", "7", "--name", "sam", "--db", db])
        .assert()
        .success();

    Command::cargo_bin("boostd")
        .unwrap()
        .args([
            "account",
            "add",
            "--owner",
            "7",
            "--name",
            "main shop",
            "--credentials",
            "cookies=abc",
            "--db",
            db,
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("first boost in"));

    Command::cargo_bin("boostd")
        .unwrap()
        .args(["account", "list", "--owner", "7", "--db", db])
        .assert()
        .success()
        .stdout(predicates::str::contains("main shop"));
}

#[test]
fn test_account_add_unknown_owner_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("smoke.db");

    Command::cargo_bin("boostd")
        .unwrap()
        .args([
            "account",
            "add",
            "--owner",
            "404",
            "--name",
            "shop",
            "--credentials",
            "c",
            "--db",
            db.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicates::str::contains("unknown owner"));
}
