// crates/reply-triage-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests running the reply-triage binary end to end.
// Purpose: Ensure step commands persist through sqlite and fail closed otherwise.
// Dependencies: reply-triage-cli binary
// ============================================================================

//! ## Overview
//! Runs the CLI binary against a temporary fixture, config, and sqlite store:
//! a flow is opened, answered step by step across invocations, committed, and
//! read back from the ledger.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn reply_triage_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_reply-triage"))
}

fn fixture() -> Value {
    json!({
        "threads": {
            "t-1": [{
                "branch_id": "b-1",
                "obligee": {"obligee_id": "o-1", "name": "Ministry of Finance"},
                "addable": ["confirmation", "refusal", "disclosure"],
                "last_action": {"action_type": "request", "legal_date": "2024-02-01", "delivered_date": null}
            }]
        },
        "obligees": []
    })
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(store: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let store_section = match store {
            "sqlite" => format!("[store]\ntype = \"sqlite\"\npath = \"{}\"\n", dir.path().join("triage.db").display()),
            _ => "[store]\ntype = \"memory\"\n".to_string(),
        };
        fs::write(dir.path().join("reply-triage.toml"), format!("{store_section}\n[audit]\nsink = \"none\"\n"))
            .unwrap();
        fs::write(dir.path().join("thread.json"), fixture().to_string()).unwrap();
        Self {
            dir,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        let config = self.path("reply-triage.toml");
        Command::new(reply_triage_bin())
            .current_dir(self.dir.path())
            .arg("--config")
            .arg(&config)
            .args(args)
            .output()
            .expect("run reply-triage")
    }

    fn run_flow(&self, command: &str, args: &[&str]) -> Output {
        let fixture = self.path("thread.json");
        let help_log = self.path("help.jsonl");
        let mut all = vec![command, "--fixture", path_str(&fixture), "--help-log", path_str(&help_log)];
        all.extend_from_slice(args);
        self.run(&all)
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn cli_catalog_lists_every_step_in_order() {
    let workspace = Workspace::new("memory");
    let catalog = stdout_json(&workspace.run(&["catalog"]));
    let keys: Vec<&str> = catalog.as_array().unwrap().iter().map(|entry| entry["key"].as_str().unwrap()).collect();
    assert_eq!(keys.first(), Some(&"basics"));
    assert_eq!(keys.last(), Some(&"categorized"));
    assert_eq!(keys.len(), 18);
}

#[test]
fn cli_config_validate_and_example() {
    let workspace = Workspace::new("sqlite");
    let config = stdout_json(&workspace.run(&["config", "validate"]));
    assert_eq!(config["store"]["type"], "sqlite");
    assert_eq!(config["navigation"]["base_path"], "/obligee-action");

    let example = workspace.run(&["config", "example"]);
    assert!(example.status.success());
    assert!(String::from_utf8_lossy(&example.stdout).contains("[store]"));

    fs::write(workspace.path("reply-triage.toml"), "[validation]\nstaleness_months = 0\n").unwrap();
    let invalid = workspace.run(&["config", "validate"]);
    assert!(!invalid.status.success());
    assert!(String::from_utf8_lossy(&invalid.stderr).contains("staleness_months"));
}

#[test]
fn cli_step_commands_require_durable_store() {
    let workspace = Workspace::new("memory");
    let output = workspace.run_flow("open", &["--thread", "t-1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("requires the sqlite store"));
}

#[test]
fn cli_flow_persists_across_invocations() {
    let workspace = Workspace::new("sqlite");

    let opened = stdout_json(&workspace.run_flow("open", &["--thread", "t-1"]));
    assert_eq!(opened["instance_id"], "obligee-action-t-1");
    assert_eq!(opened["address"], "/obligee-action/obligee-action-t-1/basics");

    let view = stdout_json(&workspace.run_flow("show", &["--instance", "obligee-action-t-1"]));
    assert_eq!(view["step"], "basics");

    let submitted = stdout_json(&workspace.run_flow(
        "submit",
        &[
            "--instance",
            "obligee-action-t-1",
            "--step",
            "basics",
            "--input",
            r#"{"branch":"b-1","delivered_date":"2024-03-01"}"#,
            "--today",
            "2024-03-05",
        ],
    ));
    assert_eq!(submitted["outcome"]["outcome"], "advanced");
    assert_eq!(submitted["address"], "/obligee-action/obligee-action-t-1/is_confirmation");

    let listed = stdout_json(&workspace.run_flow("list", &[]));
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let stale = workspace.run_flow(
        "submit",
        &["--instance", "obligee-action-t-1", "--step", "basics", "--input", "{}", "--today", "2024-03-05"],
    );
    assert!(!stale.status.success());
    assert!(String::from_utf8_lossy(&stale.stderr).contains("stale_step"));

    stdout_json(&workspace.run_flow(
        "submit",
        &[
            "--instance",
            "obligee-action-t-1",
            "--step",
            "is_confirmation",
            "--input",
            r#"{"is_confirmation":true}"#,
            "--today",
            "2024-03-05",
        ],
    ));
    let rejected = workspace.run_flow(
        "submit",
        &["--instance", "obligee-action-t-1", "--step", "categorized", "--input", "{}", "--today", "2024-03-05"],
    );
    assert_eq!(rejected.status.code(), Some(2));
    let report: Value = serde_json::from_slice(&rejected.stdout).unwrap();
    assert_eq!(report["outcome"]["outcome"], "rejected");
    assert_eq!(report["outcome"]["detail"]["legal_date"][0], "required");

    let done = stdout_json(&workspace.run_flow(
        "submit",
        &[
            "--instance",
            "obligee-action-t-1",
            "--step",
            "categorized",
            "--input",
            r#"{"legal_date":"2024-03-01"}"#,
            "--today",
            "2024-03-05",
        ],
    ));
    assert_eq!(done["address"], Value::Null);

    let committed = stdout_json(&workspace.run_flow("commit", &["--instance", "obligee-action-t-1"]));
    assert_eq!(committed["result"], "action");
    assert_eq!(committed["record"]["action"], "confirmation");

    let ledger = stdout_json(&workspace.run_flow("ledger", &["--thread", "t-1"]));
    assert_eq!(ledger["records"].as_array().unwrap().len(), 1);
    assert!(stdout_json(&workspace.run_flow("list", &[])).as_array().unwrap().is_empty());
}

#[test]
fn cli_replay_runs_whole_flow_in_memory() {
    let workspace = Workspace::new("memory");
    let script = json!({
        "open": {
            "thread_id": "t-1",
            "source": {"kind": "manual"},
            "draft": {"session_id": "s", "draft_id": "d"}
        },
        "today": "2024-03-05",
        "steps": [
            {"step": "basics", "input": {"branch": "b-1", "delivered_date": "2024-03-01"}},
            {"step": "is_confirmation", "input": {"is_confirmation": false}},
            {"step": "is_on_topic", "input": {"is_on_topic": false}},
            {"step": "not_categorized", "input": {"wants_help": true, "help_request": "Cannot tell"}}
        ],
        "commit": true
    });
    fs::write(workspace.path("script.json"), script.to_string()).unwrap();
    let script_path = workspace.path("script.json");

    let outcome = stdout_json(&workspace.run_flow("replay", &["--script", path_str(&script_path)]));
    assert_eq!(outcome["result"], "help");
    let help_log = fs::read_to_string(workspace.path("help.jsonl")).unwrap();
    assert!(help_log.contains("Cannot tell"));
}
