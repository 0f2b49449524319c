// crates/reply-triage-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and the CLI `config example` command.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for reply triage configuration. The example must always
//! load cleanly through [`crate::TriageConfig::from_toml_str`].

/// Returns a canonical example `reply-triage.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[store]
type = "sqlite"
path = "reply-triage.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000
max_versions = 50
read_pool_size = 2

[audit]
sink = "file"
path = "reply-triage-audit.jsonl"

[validation]
staleness_months = 1
file_number_max_len = 255

[navigation]
base_path = "/obligee-action"
"#,
    )
}
