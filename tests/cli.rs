//! End-to-end checks of the `nip` binary that need no network

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary run from an empty directory with no inherited DOMAINS setting
fn nip(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nip").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("DOMAINS")
        .env_remove("DNS_SERVERS")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_main_flags() {
    let dir = TempDir::new().unwrap();
    nip(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dns-servers"))
        .stdout(predicate::str::contains("--sort-by"))
        .stdout(predicate::str::contains("--qualify"));
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    nip(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_env_help() {
    let dir = TempDir::new().unwrap();
    nip(&dir)
        .arg("--env-help")
        .assert()
        .success()
        .stdout(predicate::str::contains("DNS_SERVERS"))
        .stdout(predicate::str::contains("Configuration Priority"));
}

#[test]
fn test_write_example_env() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("example.env");

    nip(&dir)
        .arg("--write-example-env")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Example configuration written"));

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.contains("DNS_SERVERS="));
}

#[test]
fn test_invalid_sort_order_rejected_by_parser() {
    let dir = TempDir::new().unwrap();
    nip(&dir)
        .args(["--sort-by", "alphabetical", "example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("alphabetical"));
}

#[test]
fn test_conflicting_color_flags() {
    let dir = TempDir::new().unwrap();
    nip(&dir)
        .args(["--color", "--no-color", "example.com"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--no-color"));
}

#[test]
fn test_no_domains_is_an_error() {
    let dir = TempDir::new().unwrap();
    nip(&dir)
        .args(["--no-speed", "--dns-servers", "127.0.0.1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No domains"));
}

#[test]
fn test_missing_env_file() {
    let dir = TempDir::new().unwrap();
    nip(&dir)
        .args(["--env-file", "does-not-exist.env", "example.com"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}
