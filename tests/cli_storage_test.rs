//! End-to-end tests driving the `bt` binary against real trees.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command as StdCommand;
use tempfile::TempDir;

fn bt(repo: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bt").unwrap();
    cmd.arg("-C").arg(repo);
    cmd
}

fn git_installed() -> bool {
    StdCommand::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git_repo() -> TempDir {
    let temp = TempDir::new().unwrap();
    for args in [
        vec!["init", "--initial-branch=main"],
        vec!["config", "user.email", "test@test.com"],
        vec!["config", "user.name", "Test"],
    ] {
        let output = StdCommand::new("git")
            .args(&args)
            .current_dir(temp.path())
            .output()
            .expect("failed to run git");
        assert!(output.status.success());
    }
    temp
}

#[test]
fn test_init_without_revision_control() {
    let temp = TempDir::new().unwrap();
    bt(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("No revision control detected."))
        .stdout(predicate::str::contains("Directory initialized."));
    assert!(temp.path().join(".bt/version").exists());
}

#[test]
fn test_init_twice_fails() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_write_read_round_trip_across_invocations() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .args(["add", "abc", "--directory"])
        .assert()
        .success();
    bt(temp.path())
        .args(["add", "abc/values", "--parent", "abc"])
        .assert()
        .success();
    bt(temp.path())
        .args(["set", "abc/values", "stored content"])
        .assert()
        .success();
    bt(temp.path())
        .args(["get", "abc/values"])
        .assert()
        .success()
        .stdout("stored content");
}

#[test]
fn test_set_from_stdin() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path()).args(["add", "abc"]).assert().success();
    bt(temp.path())
        .args(["set", "abc"])
        .write_stdin("piped in\n")
        .assert()
        .success();
    bt(temp.path())
        .args(["get", "abc"])
        .assert()
        .success()
        .stdout("piped in\n");
}

#[test]
fn test_list_children() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .args(["add", "abc", "--directory"])
        .assert()
        .success();
    bt(temp.path())
        .args(["add", "123", "--parent", "abc", "--directory"])
        .assert()
        .success();
    bt(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout("abc\n");
    bt(temp.path())
        .args(["list", "abc"])
        .assert()
        .success()
        .stdout("123\n");
}

#[test]
fn test_remove_and_recursive_remove() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .args(["add", "abc", "--directory"])
        .assert()
        .success();
    bt(temp.path())
        .args(["add", "123", "--parent", "abc", "--directory"])
        .assert()
        .success();
    bt(temp.path())
        .args(["remove", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not empty"));
    bt(temp.path())
        .args(["remove", "abc", "--recursive"])
        .assert()
        .success();
    bt(temp.path())
        .args(["get", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown identifier"));
}

#[test]
fn test_unknown_identifier_message() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .args(["get", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown identifier: missing"));
}

#[test]
fn test_uninitialized_tree_reports_connection_error() {
    let temp = TempDir::new().unwrap();
    bt(temp.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("run `bt init` first"));
}

#[test]
fn test_storage_version_mismatch_is_fatal() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    std::fs::write(temp.path().join(".bt/version"), "999\n").unwrap();
    bt(temp.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported storage version"));
}

#[test]
fn test_destroy_removes_storage() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .arg("destroy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Storage removed."));
    assert!(!temp.path().join(".bt").exists());
}

#[test]
fn test_commit_without_revision_control() {
    let temp = TempDir::new().unwrap();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .args(["commit", "anything"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no revision control"));
}

#[test]
fn test_init_detects_git() {
    if !git_installed() {
        return;
    }
    let temp = git_repo();
    bt(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Using git for revision control."));
}

#[test]
fn test_git_commit_revision_and_changed() {
    if !git_installed() {
        return;
    }
    let temp = git_repo();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .args(["add", "abc", "--directory"])
        .assert()
        .success();
    bt(temp.path())
        .args(["add", "abc/values", "--parent", "abc"])
        .assert()
        .success();
    bt(temp.path())
        .args(["set", "abc/values", "v1\n"])
        .assert()
        .success();
    bt(temp.path())
        .args(["commit", "first", "--body", "longer text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Committed "));

    // Nothing pending: the empty-commit gate trips.
    bt(temp.path())
        .args(["commit", "empty"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to commit"));
    bt(temp.path())
        .args(["commit", "empty", "--allow-empty"])
        .assert()
        .success();

    // Index 1 is the first revision; -1 is the newest.
    let first = stdout_of(bt(temp.path()).args(["revision", "1"]));
    let newest = stdout_of(bt(temp.path()).args(["revision", "-1"]));
    assert_ne!(first, newest);
    bt(temp.path())
        .args(["revision", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid revision"));

    // Changes since the first revision: one modified, one added.
    bt(temp.path())
        .args(["set", "abc/values", "v2\n"])
        .assert()
        .success();
    bt(temp.path())
        .args(["add", "def", "--parent", "abc"])
        .assert()
        .success();
    bt(temp.path())
        .args(["set", "def", "fresh\n"])
        .assert()
        .success();
    let report = stdout_of(bt(temp.path()).args(["changed", &first]));
    let added_section = report.split("Modified:").next().unwrap().to_string();
    assert!(added_section.contains("def"));
    assert!(report.contains("abc/values"));
}

#[test]
fn test_get_at_revision_with_git() {
    if !git_installed() {
        return;
    }
    let temp = git_repo();
    bt(temp.path()).arg("init").assert().success();
    bt(temp.path())
        .args(["add", "abc", "--directory"])
        .assert()
        .success();
    bt(temp.path())
        .args(["add", "abc/values", "--parent", "abc"])
        .assert()
        .success();
    bt(temp.path())
        .args(["set", "abc/values", "v1\n"])
        .assert()
        .success();
    bt(temp.path())
        .args(["commit", "first"])
        .assert()
        .success();
    bt(temp.path())
        .args(["set", "abc/values", "v2\n"])
        .assert()
        .success();

    let first = stdout_of(bt(temp.path()).args(["revision", "1"]));
    bt(temp.path())
        .args(["get", "abc/values", "--revision", &first])
        .assert()
        .success()
        .stdout("v1\n");
    bt(temp.path())
        .args(["get", "abc/values"])
        .assert()
        .success()
        .stdout("v2\n");
}

#[test]
fn test_user_prints_an_identity() {
    let temp = TempDir::new().unwrap();
    bt(temp.path())
        .arg("user")
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

fn stdout_of(cmd: &mut Command) -> String {
    let assert = cmd.assert().success();
    String::from_utf8(assert.get_output().stdout.clone())
        .unwrap()
        .trim()
        .to_string()
}
