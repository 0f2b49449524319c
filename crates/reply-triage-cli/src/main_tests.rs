// crates/reply-triage-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and replay script decoding.
// Purpose: Ensure malformed arguments and scripts fail before touching a store.
// Dependencies: reply-triage-cli main helpers
// ============================================================================

//! ## Overview
//! Validates clap wiring, step key and date parsers, and the replay script
//! shape accepted by `replay`.

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

use clap::Parser;
use reply_triage_core::InputSource;
use reply_triage_core::StepKey;
use time::macros::date;

use super::Cli;
use super::Commands;
use super::ReplayScript;
use super::parse_date;
use super::parse_step_key;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn step_keys_and_dates_parse_strictly() {
    assert_eq!(parse_step_key("is_on_topic").unwrap(), StepKey::IsOnTopic);
    assert!(parse_step_key("IsOnTopic").is_err());
    assert_eq!(parse_date("2024-02-29").unwrap(), date!(2024 - 02 - 29));
    assert!(parse_date("2023-02-29").is_err());
    assert!(parse_date("05.03.2024").is_err());
}

#[test]
fn submit_arguments_parse() {
    let cli = Cli::try_parse_from([
        "reply-triage",
        "--config",
        "triage.toml",
        "submit",
        "--fixture",
        "thread.json",
        "--instance",
        "obligee-action-t-1",
        "--step",
        "basics",
        "--input",
        "{\"branch\":\"b-1\"}",
        "--today",
        "2024-03-05",
    ])
    .unwrap();
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("triage.toml")));
    let Commands::Submit(command) = cli.command else {
        panic!("expected submit command");
    };
    assert_eq!(command.step, StepKey::Basics);
    assert_eq!(command.today, Some(date!(2024 - 03 - 05)));
    assert_eq!(command.host.help_log, std::path::PathBuf::from("reply-triage-help.jsonl"));
}

#[test]
fn submit_rejects_conflicting_inputs_and_unknown_steps() {
    let conflicting = Cli::try_parse_from([
        "reply-triage",
        "submit",
        "--fixture",
        "f.json",
        "--instance",
        "i",
        "--step",
        "basics",
        "--input",
        "{}",
        "--input-file",
        "in.json",
    ]);
    assert!(conflicting.is_err());
    let unknown =
        Cli::try_parse_from(["reply-triage", "back", "--fixture", "f.json", "--instance", "i", "--step", "nope"]);
    assert!(unknown.is_err());
}

#[test]
fn replay_script_decodes() {
    let script: ReplayScript = serde_json::from_str(
        r#"{
            "open": {
                "thread_id": "t-1",
                "source": {"kind": "manual"},
                "draft": {"session_id": "s", "draft_id": "d"}
            },
            "today": "2024-03-05",
            "steps": [{"step": "basics", "input": {"branch": "b-1"}}],
            "commit": true
        }"#,
    )
    .unwrap();
    assert_eq!(script.open.source, InputSource::Manual);
    assert_eq!(script.today, date!(2024 - 03 - 05));
    assert_eq!(script.steps[0].step, StepKey::Basics);
    assert!(script.commit);
}

#[test]
fn replay_script_rejects_unknown_fields() {
    let result = serde_json::from_str::<ReplayScript>(
        r#"{"open": {"thread_id": "t", "source": {"kind": "manual"}, "draft": {"session_id": "s", "draft_id": "d"}},
            "today": "2024-03-05", "steps": [], "autocommit": true}"#,
    );
    assert!(result.is_err());
}
