use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn sample_nt(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("data.nt");
    fs::write(
        &path,
        "<http://example.com/a> <http://example.com/p> <http://example.com/b> .\n\
         <http://example.com/a> <http://example.com/p> \"hello\" .\n",
    )
    .unwrap();
    path
}

#[test]
fn run_executes_a_bgp_against_an_imported_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = sample_nt(&dir);
    Command::cargo_bin("tristore")
        .unwrap()
        .arg("run")
        .arg("--import")
        .arg(&data)
        .arg("bgp")
        .arg("?s")
        .arg("<http://example.com/p>")
        .arg("?o")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("s=<http://example.com/a>")
                .and(predicate::str::contains("o=\"hello\"")),
        );
}

#[test]
fn run_supports_construction_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let data = sample_nt(&dir);
    Command::cargo_bin("tristore")
        .unwrap()
        .arg("run")
        .arg("--import")
        .arg(&data)
        .arg("begin ?s ?p ?o ; filter contains ?o \"ell\" ; end")
        .assert()
        .success()
        .stdout(predicate::str::contains("o=\"hello\""));
}

#[test]
fn run_rejects_unknown_commands() {
    Command::cargo_bin("tristore")
        .unwrap()
        .args(["run", "frobnicate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized operation"));
}

#[test]
fn run_reports_dangling_construction() {
    Command::cargo_bin("tristore")
        .unwrap()
        .args(["run", "begin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing `end`"));
}

#[test]
fn snapshot_round_trips_through_the_cli() {
    let dir = tempfile::tempdir().unwrap();
    let data = sample_nt(&dir);
    let snapshot = dir.path().join("store.db");
    Command::cargo_bin("tristore")
        .unwrap()
        .arg("run")
        .arg("--import")
        .arg(&data)
        .arg(format!("dump {}", snapshot.display()))
        .assert()
        .success();
    Command::cargo_bin("tristore")
        .unwrap()
        .arg("run")
        .arg("--load")
        .arg(&snapshot)
        .arg("size")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 triples"));
}
