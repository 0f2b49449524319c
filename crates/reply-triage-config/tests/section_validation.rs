// crates/reply-triage-config/tests/section_validation.rs
// ============================================================================
// Module: Config Section Validation Tests
// Description: Per-section range and consistency checks.
// Purpose: Ensure invalid store, audit, validation, and navigation values fail closed.
// ============================================================================

//! Section validation tests for reply-triage-config.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::PathBuf;

use reply_triage_config::AuditSinkType;
use reply_triage_config::ConfigError;
use reply_triage_config::TriageConfig;
use reply_triage_core::ValidationSettings;
use reply_triage_store_sqlite::SqliteStoreMode;
use reply_triage_store_sqlite::SqliteSyncMode;

fn invalid(content: &str) -> String {
    match TriageConfig::from_toml_str(content) {
        Err(ConfigError::Invalid(message)) => message,
        Err(other) => panic!("expected invalid config, got {other}"),
        Ok(_) => panic!("expected invalid config for {content}"),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

#[test]
fn sqlite_store_requires_path() {
    assert!(invalid("[store]\ntype = \"sqlite\"\n").contains("requires path"));
}

#[test]
fn memory_store_rejects_path() {
    assert!(invalid("[store]\ntype = \"memory\"\npath = \"x.db\"\n").contains("must not set path"));
}

#[test]
fn sqlite_store_rejects_out_of_range_limits() {
    assert!(invalid("[store]\ntype = \"sqlite\"\npath = \"x.db\"\nmax_versions = 0\n").contains("max_versions"));
    assert!(invalid("[store]\ntype = \"sqlite\"\npath = \"x.db\"\nread_pool_size = 0\n").contains("read_pool_size"));
    assert!(
        invalid("[store]\ntype = \"sqlite\"\npath = \"x.db\"\nbusy_timeout_ms = 600000\n").contains("busy_timeout_ms")
    );
}

#[test]
fn sqlite_store_maps_to_backend_config() {
    let config = TriageConfig::from_toml_str(
        "[store]\ntype = \"sqlite\"\npath = \"data/x.db\"\njournal_mode = \"delete\"\nsync_mode = \"normal\"\n",
    )
    .unwrap();
    let sqlite = config.store.sqlite_config().unwrap();
    assert_eq!(sqlite.path, PathBuf::from("data/x.db"));
    assert_eq!(sqlite.journal_mode, SqliteStoreMode::Delete);
    assert_eq!(sqlite.sync_mode, SqliteSyncMode::Normal);
    assert_eq!(sqlite.read_pool_size, 2);
    assert!(sqlite.validate().is_ok());
}

// ============================================================================
// SECTION: Audit
// ============================================================================

#[test]
fn file_audit_sink_requires_path() {
    assert!(invalid("[audit]\nsink = \"file\"\n").contains("requires path"));
    assert!(invalid("[audit]\nsink = \"file\"\npath = \"  \"\n").contains("non-empty"));
}

#[test]
fn non_file_audit_sink_rejects_path() {
    assert!(invalid("[audit]\nsink = \"stderr\"\npath = \"a.jsonl\"\n").contains("only valid for the file sink"));
    let config = TriageConfig::from_toml_str("[audit]\nsink = \"none\"\n").unwrap();
    assert_eq!(config.audit.sink, AuditSinkType::None);
}

// ============================================================================
// SECTION: Validation Limits
// ============================================================================

#[test]
fn staleness_months_is_bounded() {
    assert!(invalid("[validation]\nstaleness_months = 0\n").contains("staleness_months"));
    assert!(invalid("[validation]\nstaleness_months = 13\n").contains("staleness_months"));
    let config = TriageConfig::from_toml_str("[validation]\nstaleness_months = 3\n").unwrap();
    assert_eq!(config.wizard_config().settings.staleness_months, 3);
}

#[test]
fn file_number_max_len_is_bounded() {
    assert!(invalid("[validation]\nfile_number_max_len = 0\n").contains("file_number_max_len"));
    let config = TriageConfig::from_toml_str("[validation]\nfile_number_max_len = 64\n").unwrap();
    assert_eq!(
        config.validation.settings(),
        ValidationSettings {
            staleness_months: 1,
            file_number_max_len: 64,
        }
    );
}

// ============================================================================
// SECTION: Navigation
// ============================================================================

#[test]
fn base_path_must_be_absolute_and_clean() {
    assert!(invalid("[navigation]\nbase_path = \"obligee-action\"\n").contains("start with '/'"));
    assert!(invalid("[navigation]\nbase_path = \"/obligee action\"\n").contains("whitespace"));
    let config = TriageConfig::from_toml_str("[navigation]\nbase_path = \"/replies/\"\n").unwrap();
    assert_eq!(config.navigation.base_path, "/replies/");
}
