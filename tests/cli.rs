//! End-to-end runs of the `remold` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const LEGACY: &str = "const { expect } = require('chai');\n\nexpect(a).to.equal(1);\n";
const MIGRATED: &str = "const assert = require('node:assert');\n\nassert.strictEqual(a, 1);\n";

fn remold() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_remold"));
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

#[test]
fn path_is_required() {
    remold()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("required"));
}

#[test]
fn dry_run_leaves_files_alone() {
    let dir = project(&[("a.test.js", LEGACY)]);
    remold()
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("would migrate"));
    assert_eq!(read(dir.path(), "a.test.js"), LEGACY);
}

#[test]
fn write_rewrites_in_place() {
    let dir = project(&[("a.test.js", LEGACY), ("lib/util.js", LEGACY)]);
    remold()
        .arg(dir.path())
        .arg("--write")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrated"));
    assert_eq!(read(dir.path(), "a.test.js"), MIGRATED);
    // not a test file
    assert_eq!(read(dir.path(), "lib/util.js"), LEGACY);
}

#[test]
fn check_fails_on_pending_changes() {
    let dir = project(&[("a.test.js", LEGACY)]);
    remold().arg(dir.path()).arg("--check").assert().code(1);
    remold()
        .arg(dir.path())
        .args(["--check", "--write"])
        .assert()
        .success();
    remold().arg(dir.path()).arg("--check").assert().success();
}

#[test]
fn json_output_has_summary() {
    let dir = project(&[("a.test.js", LEGACY), ("b.test.js", MIGRATED)]);
    let output = remold().arg(dir.path()).arg("--json").output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["filesScanned"], 2);
    assert_eq!(json["summary"]["filesChanged"], 1);
    assert_eq!(json["summary"]["filesWritten"], 0);
    assert_eq!(json["results"].as_array().unwrap().len(), 2);
}

#[test]
fn print_writes_migrated_source_to_stdout() {
    let dir = project(&[("a.test.js", LEGACY)]);
    remold()
        .arg(dir.path().join("a.test.js"))
        .arg("--print")
        .assert()
        .success()
        .stdout(MIGRATED);
    assert_eq!(read(dir.path(), "a.test.js"), LEGACY);
}

#[test]
fn selected_migrations_only() {
    let source = "const sinon = require('sinon');\n\nconst cb = sinon.spy();\nexpect(a).to.equal(1);\n";
    let dir = project(&[("a.test.js", source)]);
    remold()
        .arg(dir.path().join("a.test.js"))
        .args(["--print", "--migrate", "mocks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("const cb = mock.fn();"))
        .stdout(predicate::str::contains("expect(a).to.equal(1);"));
}

#[test]
fn init_writes_config_once() {
    let dir = TempDir::new().unwrap();
    remold()
        .arg("init")
        .arg("--dir")
        .arg(dir.path())
        .args(["--migrate", "assertions,mocks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("migrations=mocks,assertions"));
    let config: serde_json::Value =
        serde_json::from_str(&read(dir.path(), ".remoldrc.json")).unwrap();
    assert!(config["migrations"].is_array());

    remold()
        .arg("init")
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn config_file_selects_migrations() {
    let dir = project(&[
        (".remoldrc.json", r#"{ "migrations": ["mocks"] }"#),
        ("a.test.js", LEGACY),
    ]);
    remold()
        .arg(dir.path())
        .arg("--write")
        .assert()
        .success();
    assert_eq!(read(dir.path(), "a.test.js"), LEGACY);
}

#[test]
fn empty_directory_reports_no_files() {
    let dir = TempDir::new().unwrap();
    remold()
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No test files found"));
}

#[test]
fn unparseable_only_input_fails() {
    let dir = project(&[("broken.test.js", "expect(a).to.equal(;\n")]);
    remold()
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("syntax error"));
}

#[test]
fn unparseable_file_does_not_stop_the_run() {
    let dir = project(&[
        ("broken.test.js", "expect(a).to.equal(;\n"),
        ("a.test.js", LEGACY),
    ]);
    remold()
        .arg(dir.path())
        .arg("--write")
        .assert()
        .success();
    assert_eq!(read(dir.path(), "a.test.js"), MIGRATED);
    assert_eq!(read(dir.path(), "broken.test.js"), "expect(a).to.equal(;\n");
}
