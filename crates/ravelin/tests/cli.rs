use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn ravelin() -> Command {
    Command::cargo_bin("ravelin").unwrap()
}

#[test]
fn help_succeeds() {
    ravelin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--compile"));
}

#[test]
fn configprint_prints_resolved_settings() {
    let confdir = tempfile::tempdir().unwrap();
    let vardir = tempfile::tempdir().unwrap();

    ravelin()
        .args(["--configprint", "--confdir"])
        .arg(confdir.path())
        .arg("--vardir")
        .arg(vardir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("confdir = "))
        .stdout(predicate::str::contains("node_cache_terminus = write_only_yaml"));
}

#[test]
fn compile_miss_exits_with_the_compile_failure_code() {
    let confdir = tempfile::tempdir().unwrap();
    let vardir = tempfile::tempdir().unwrap();

    ravelin()
        .args(["--compile", "ghost", "--confdir"])
        .arg(confdir.path())
        .arg("--vardir")
        .arg(vardir.path())
        .assert()
        .code(30)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn compile_prints_the_catalog_and_migration_warnings() {
    let confdir = tempfile::tempdir().unwrap();
    let vardir = tempfile::tempdir().unwrap();

    let nodes = confdir.path().join("nodes");
    fs::create_dir_all(&nodes).unwrap();
    fs::write(
        nodes.join("web01.yaml"),
        concat!(
            "resources:\n",
            "  - type: service\n",
            "    title: nginx\n",
            "    parameters:\n",
            "      workers: \"4\"\n",
        ),
    )
    .unwrap();

    ravelin()
        .args(["--migrate", "web01", "--confdir"])
        .arg(confdir.path())
        .arg("--vardir")
        .arg(vardir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"web01\""))
        .stdout(predicate::str::contains("MIGRATION WARNING: MIG-0001"));
}

#[test]
fn compile_writes_through_the_node_cache() {
    let confdir = tempfile::tempdir().unwrap();
    let vardir = tempfile::tempdir().unwrap();

    let nodes = confdir.path().join("nodes");
    fs::create_dir_all(&nodes).unwrap();
    fs::write(nodes.join("db01.yaml"), "classes: []\n").unwrap();

    ravelin()
        .args(["--compile", "db01", "--confdir"])
        .arg(confdir.path())
        .arg("--vardir")
        .arg(vardir.path())
        .assert()
        .success();

    assert!(vardir.path().join("cache/node/db01.yaml").is_file());
}

#[test]
fn conflicting_compile_flags_are_rejected() {
    ravelin()
        .args(["--compile", "a", "--migrate", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}
