//! The `stix2misp` binary end to end: status line, exit code, files.

use std::fs;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use serde_json::Value;

fn stix2misp(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stix2misp"))
        .args(args)
        .current_dir(dir)
        .env_remove("STIX2MISP_LOG")
        .output()
        .expect("binary should start")
}

fn status_line(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "stdout: {stdout}");
    serde_json::from_str(stdout.trim()).expect("status line is JSON")
}

#[test]
fn success_prints_counts_and_writes_sibling_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("bundle.json"),
        r#"{"type":"bundle","objects":[
            {"type":"indicator","id":"indicator--1","pattern":"[domain-name:value = 'x.example']"},
            {"type":"note","id":"note--1"}
        ]}"#,
    )
    .unwrap();

    let output = stix2misp(dir.path(), &["bundle.json", "--report", "report.json"]);
    assert!(output.status.success());
    let status = status_line(&output);
    assert_eq!(status["success"], 1);
    assert_eq!(status["output"], "bundle.json.stix2");
    assert_eq!(status["attributes"], 1);
    assert_eq!(status["objects"], 1);
    assert_eq!(status["skipped"], 1);
    assert!(dir.path().join("bundle.json.stix2").exists());

    let report: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("report.json")).unwrap()).unwrap();
    assert_eq!(report["skips"][0]["object_id"], "note--1");
}

#[test]
fn single_unrecognised_object_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("bundle.json"),
        r#"{"type":"bundle","objects":[{"type":"x-acme","id":"x-acme--1"}]}"#,
    )
    .unwrap();

    let output = stix2misp(dir.path(), &["bundle.json"]);
    assert_eq!(output.status.code(), Some(1));
    let status = status_line(&output);
    assert_eq!(status["success"], 0);
    assert_eq!(status["message"], "There is no valid STIX object to import");
}

#[test]
fn unreadable_input_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bundle.json"), "not json").unwrap();

    let output = stix2misp(dir.path(), &["bundle.json"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(status_line(&output)["success"], 0);
}

#[test]
fn configured_suffix_names_the_output() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("bundle.json"),
        r#"{"type":"bundle","objects":[{"type":"vulnerability","id":"vulnerability--1","name":"CVE-2017-0144"}]}"#,
    )
    .unwrap();
    fs::write(dir.path().join("extra.toml"), "[general]\noutput_suffix = \".misp.json\"\n").unwrap();

    let output = stix2misp(dir.path(), &["bundle.json", "--config", "extra.toml", "--quiet"]);
    assert!(output.status.success());
    assert_eq!(status_line(&output)["output"], "bundle.json.misp.json");
    assert!(dir.path().join("bundle.json.misp.json").exists());
}
