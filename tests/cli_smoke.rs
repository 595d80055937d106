use assert_cmd::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let site = json!({
            "pages": [{
                "url": "https://app.test/login",
                "title": "Login",
                "nodes": [
                    { "role": "heading", "name": "Please sign in", "text": "Please sign in" },
                    { "role": "textbox", "name": "Email", "placeholder": "you@example.com" },
                    { "role": "button", "name": "Sign In", "text": "Sign In",
                      "css": "form > button.primary" }
                ]
            }]
        });
        fs::write(dir.path().join("site.json"), site.to_string()).expect("fixture");
        let config = format!(
            "engine:\n  type: fixture\n  path: {}\nhealing:\n  healing_timeout_ms: 2000\n",
            dir.path().join("site.json").display()
        );
        fs::write(dir.path().join("selfheal.yaml"), config).expect("config");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write");
        path
    }

    fn selfheal(&self) -> Command {
        let bin = assert_cmd::cargo::cargo_bin!("selfheal");
        let mut cmd = Command::new(bin);
        cmd.current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .args(["--log-level", "warn", "--config"])
            .arg(self.path("selfheal.yaml"));
        cmd
    }
}

const LOGIN_PLAN: &str = r#"
name: login
steps:
  - id: open
    kind: navigate
    value: https://app.test/login
  - id: email
    kind: fill
    target_description: Email field
    value: ada@example.com
  - id: submit
    kind: click
    target_description: Sign In button
  - id: greeting
    kind: extract
    target_description: Please sign in heading
"#;

fn trace_lines(path: &Path) -> usize {
    fs::read_to_string(path)
        .expect("trace file")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count()
}

#[test]
fn run_inspect_and_codegen_round_trip() {
    let ws = Workspace::new();
    let plan = ws.write("login.yaml", LOGIN_PLAN);
    let traces = ws.path("traces");

    let assert = ws
        .selfheal()
        .arg("run")
        .arg("--plan")
        .arg(&plan)
        .arg("--trace-dir")
        .arg(&traces)
        .arg("--json")
        .assert()
        .success();
    let report: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("report is JSON");
    assert_eq!(report["total_steps"], 4);
    assert_eq!(report["successful_steps"], 4);
    assert_eq!(report["healed_steps"], 0);
    assert!(report["failure"].is_null());
    assert_eq!(trace_lines(&traces.join("trace.jsonl")), 4);
    assert_eq!(trace_lines(&traces.join("events.jsonl")), 4);

    let assert = ws
        .selfheal()
        .args(["inspect", "--step", "submit", "--trace"])
        .arg(traces.join("trace.jsonl"))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("submit [ok] click"), "{stdout}");

    let replay = ws.path("replay.yaml");
    ws.selfheal()
        .args(["codegen", "--format", "plan", "--trace"])
        .arg(traces.join("trace.jsonl"))
        .arg("--out")
        .arg(&replay)
        .assert()
        .success();
    let generated = fs::read_to_string(&replay).expect("generated plan");
    assert!(generated.contains("submit"));

    ws.selfheal()
        .arg("run")
        .arg("--plan")
        .arg(&replay)
        .arg("--trace-dir")
        .arg(ws.path("replay-traces"))
        .assert()
        .success();
    assert_eq!(trace_lines(&ws.path("replay-traces/trace.jsonl")), 4);
}

#[test]
fn exhausted_step_exits_non_zero_and_keeps_trace() {
    let ws = Workspace::new();
    let plan = ws.write(
        "broken.yaml",
        r#"
name: broken
steps:
  - id: forgot
    kind: click
    target_description: Forgot password link
    timeout_ms: 200
"#,
    );
    let traces = ws.path("traces");

    let assert = ws
        .selfheal()
        .arg("run")
        .arg("--plan")
        .arg(&plan)
        .arg("--trace-dir")
        .arg(&traces)
        .arg("--json")
        .assert()
        .failure();
    let report: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("partial report is JSON");
    assert_eq!(report["successful_steps"], 0);
    assert_eq!(report["failure"]["step_id"], "forgot");
    assert_eq!(report["failure"]["attempts"].as_array().map(Vec::len), Some(5));
    assert_eq!(trace_lines(&traces.join("trace.jsonl")), 5);
}

#[test]
fn resolve_ranks_candidates() {
    let ws = Workspace::new();
    let assert = ws
        .selfheal()
        .arg("resolve")
        .arg("--snapshot")
        .arg(ws.path("site.json"))
        .args(["--target", "Sign In button", "--json"])
        .assert()
        .success();
    let ranked: Value = serde_json::from_slice(&assert.get_output().stdout).expect("JSON");
    let first = &ranked[0];
    assert_eq!(first["rank"], 1);
    assert_eq!(first["confirmed"], true);
    assert!(first["locator"].as_str().unwrap_or_default().contains("Sign In"));
}

#[test]
fn invalid_plan_is_rejected() {
    let ws = Workspace::new();
    let plan = ws.write(
        "dup.yaml",
        "steps:\n  - id: a\n    kind: extract\n    target_description: Email field\n  - id: a\n    kind: extract\n    target_description: Email field\n",
    );
    ws.selfheal()
        .arg("run")
        .arg("--plan")
        .arg(&plan)
        .assert()
        .failure();
    assert!(!ws.path("traces").exists());
}
