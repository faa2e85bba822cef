//! End-to-end tests for the warden CLI.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

/// A script file in a temporary directory.
struct TestScript {
    _temp_dir: TempDir,
    path: PathBuf,
}

impl TestScript {
    fn new(source: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("script.jsonl");
        fs::write(&path, source).expect("Failed to write script");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    fn path(&self) -> &str {
        self.path.to_str().unwrap()
    }
}

fn warden() -> Command {
    Command::cargo_bin("warden").expect("Failed to find warden binary")
}

/// Parse every stdout line as JSON.
fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is not JSON"))
        .collect()
}

#[test]
fn test_run_script_round_trip() {
    let script = TestScript::new(
        r#"{"method": "spawn_isolate", "arguments": {"isolate_id": "a", "entry_point": 1}}
{"method": "spawn_isolate", "arguments": {"isolate_id": "a", "entry_point": 1}}

# unknown entry point
{"method": "spawn_isolate", "arguments": {"isolate_id": "x", "entry_point": 99}}
{"method": "spawn_isolate", "arguments": {"isolate_id": "b", "entry_point": 1}}
{"method": "kill_isolate", "arguments": {"isolate_id": "a"}}
{"method": "kill_isolate", "arguments": {"isolate_id": "ghost"}}
{"method": "pause_isolate"}
"#,
    );

    let output = warden().args(["run", script.path()]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = json_lines(&output.stdout);
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], json!({"status": "success", "result": null}));
    assert_eq!(lines[1]["code"], "duplicate_isolate");
    assert_eq!(lines[2]["code"], "resolution_failed");
    assert_eq!(lines[3]["status"], "success");
    assert_eq!(lines[4], json!({"status": "success", "result": true}));
    assert_eq!(lines[5], json!({"status": "success", "result": true}));
    assert_eq!(lines[6], json!({"status": "not_implemented"}));
    assert_eq!(lines[7], json!({"queued": [], "starting": null, "active": ["b"]}));
}

#[test]
fn test_run_reads_stdin() {
    let output = warden()
        .arg("run")
        .write_stdin(r#"{"method": "spawn_isolate", "arguments": {"isolate_id": "s", "entry_point": 1}}"#)
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines = json_lines(&output.stdout);
    assert_eq!(lines[0]["status"], "success");
    assert_eq!(lines[1]["active"], json!(["s"]));
}

#[test]
fn test_silent_isolate_times_out() {
    let script = TestScript::new(
        r#"{"method": "spawn_isolate", "arguments": {"isolate_id": "quiet", "entry_point": 2}}
{"method": "spawn_isolate", "arguments": {"isolate_id": "next", "entry_point": 1}}
"#,
    );

    let output = warden()
        .args(["run", script.path(), "--handshake-timeout-ms", "100"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines = json_lines(&output.stdout);
    assert_eq!(lines[0]["code"], "handshake_timeout");
    assert_eq!(lines[1]["status"], "success");
    assert_eq!(lines[2]["active"], json!(["next"]));
}

#[test]
fn test_crashing_isolate_is_reported() {
    let script = TestScript::new(
        r#"{"method": "spawn_isolate", "arguments": {"isolate_id": "boom", "entry_point": 3}}"#,
    );

    let output = warden().args(["run", script.path()]).output().unwrap();
    assert!(output.status.success());

    let lines = json_lines(&output.stdout);
    assert_eq!(lines[0]["code"], "handshake_abandoned");
    assert_eq!(lines[1]["active"], json!([]));
}

#[test]
fn test_run_nonexistent_script() {
    warden()
        .args(["run", "/nonexistent/script.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read script"));
}

#[test]
fn test_run_rejects_malformed_line() {
    let script = TestScript::new("{\"method\": \"kill_isolate\", \"arguments\": {\"isolate_id\": \"a\"}}\nnot json\n");

    warden()
        .args(["run", script.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid method call on line 2"));
}

#[test]
fn test_entries_lists_builtins() {
    warden()
        .arg("entries")
        .assert()
        .success()
        .stdout(predicate::str::contains("idle").and(predicate::str::contains("silent")))
        .stdout(predicate::str::contains("crash"));
}
