// crates/reply-triage-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Wizard Store Unit Tests
// Description: Targeted integrity tests for the SQLite wizard store.
// Purpose: Validate path safety, schema versioning, compare-and-set saves,
//          atomic commits, retention, and corruption detection.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Path safety checks and schema version validation
//! - Version compare-and-set on save and commit
//! - Commit atomicity, ledger ordering, and record identifier uniqueness
//! - Hash verification of stored payloads
//! - Durability of in-progress flows across store reopen

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use reply_triage_core::ActionType;
use reply_triage_core::AttachmentError;
use reply_triage_core::AttachmentRef;
use reply_triage_core::AttachmentStaging;
use reply_triage_core::BranchId;
use reply_triage_core::BranchSnapshot;
use reply_triage_core::ClassificationRecord;
use reply_triage_core::CommitBatch;
use reply_triage_core::CommitOutcome;
use reply_triage_core::DirectoryError;
use reply_triage_core::DispositionRecord;
use reply_triage_core::DraftId;
use reply_triage_core::DraftRef;
use reply_triage_core::InputSource;
use reply_triage_core::LastAction;
use reply_triage_core::MessageDisposition;
use reply_triage_core::MessageId;
use reply_triage_core::NoopHelpDesk;
use reply_triage_core::ObligeeDirectory;
use reply_triage_core::ObligeeId;
use reply_triage_core::ObligeeRef;
use reply_triage_core::OpenRequest;
use reply_triage_core::SessionId;
use reply_triage_core::StepCatalog;
use reply_triage_core::StepCursor;
use reply_triage_core::StepKey;
use reply_triage_core::StoreError;
use reply_triage_core::SubmitOutcome;
use reply_triage_core::SubmitRequest;
use reply_triage_core::ThreadError;
use reply_triage_core::ThreadId;
use reply_triage_core::ThreadReader;
use reply_triage_core::Wizard;
use reply_triage_core::WizardConfig;
use reply_triage_core::WizardInstance;
use reply_triage_core::WizardKind;
use reply_triage_core::WizardStore;
use reply_triage_store_sqlite::SqliteStoreConfig;
use reply_triage_store_sqlite::SqliteStoreError;
use reply_triage_store_sqlite::SqliteStoreMode;
use reply_triage_store_sqlite::SqliteWizardStore;
use rusqlite::Connection;
use rusqlite::params;
use serde_json::json;
use tempfile::TempDir;
use time::macros::date;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn store_for(path: &Path, max_versions: Option<u64>) -> SqliteWizardStore {
    let mut config = SqliteStoreConfig::for_path(path.to_path_buf());
    config.busy_timeout_ms = 1_000;
    config.max_versions = max_versions;
    SqliteWizardStore::new(config).expect("store init")
}

fn sample_instance(thread: &str) -> WizardInstance {
    WizardInstance::new(
        WizardKind::ObligeeAction,
        ThreadId::new(thread),
        InputSource::Manual,
        DraftRef {
            session_id: SessionId::new("session-1"),
            draft_id: DraftId::new("draft-1"),
        },
    )
}

fn disposition_batch(instance: &WizardInstance, expected_version: u64, message: &str) -> CommitBatch {
    CommitBatch {
        instance_id: instance.instance_id.clone(),
        expected_version,
        thread_id: instance.thread_id.clone(),
        record: None,
        backfill: None,
        disposition: Some(DispositionRecord {
            message_id: MessageId::new(message),
            disposition: MessageDisposition::Unrelated,
        }),
    }
}

fn count_versions(path: &Path) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("SELECT COUNT(1) FROM wizard_instance_versions", params![], |row| row.get(0)).unwrap()
}

// ============================================================================
// SECTION: Path Safety and Schema
// ============================================================================

#[test]
fn sqlite_store_rejects_directory_path() {
    let temp = TempDir::new().unwrap();
    let Err(err) = SqliteWizardStore::new(SqliteStoreConfig::for_path(temp.path().to_path_buf())) else {
        panic!("expected invalid directory path to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_rejects_empty_path() {
    let Err(err) = SqliteWizardStore::new(SqliteStoreConfig::for_path(PathBuf::new())) else {
        panic!("expected empty path to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_rejects_zero_limits() {
    let temp = TempDir::new().unwrap();
    let mut config = SqliteStoreConfig::for_path(temp.path().join("store.sqlite"));
    config.max_versions = Some(0);
    assert!(matches!(SqliteWizardStore::new(config.clone()), Err(SqliteStoreError::Invalid(_))));
    config.max_versions = None;
    config.read_pool_size = 0;
    assert!(matches!(SqliteWizardStore::new(config), Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_store_rejects_unknown_schema_version() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE store_meta (version INTEGER NOT NULL);").unwrap();
    conn.execute("INSERT INTO store_meta (version) VALUES (?1)", params![999_i64]).unwrap();

    let Err(err) = SqliteWizardStore::new(SqliteStoreConfig::for_path(path)) else {
        panic!("expected schema mismatch to fail");
    };
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn sqlite_store_sets_journal_mode() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let _store = store_for(&path, None);
    let conn = Connection::open(&path).unwrap();
    let mode: String = conn.query_row("PRAGMA journal_mode", params![], |row| row.get(0)).unwrap();
    assert_eq!(mode.to_lowercase(), "wal");

    let delete_path = temp.path().join("delete.sqlite");
    let mut config = SqliteStoreConfig::for_path(delete_path.clone());
    config.journal_mode = SqliteStoreMode::Delete;
    let _store = SqliteWizardStore::new(config).unwrap();
    let conn = Connection::open(&delete_path).unwrap();
    let mode: String = conn.query_row("PRAGMA journal_mode", params![], |row| row.get(0)).unwrap();
    assert_eq!(mode.to_lowercase(), "delete");
}

// ============================================================================
// SECTION: Compare-And-Set Saves
// ============================================================================

#[test]
fn sqlite_store_load_missing_instance_returns_none() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"), None);
    let instance = sample_instance("t-1");
    assert!(store.load(&instance.instance_id).unwrap().is_none());
    assert!(store.readiness().is_ok());
}

#[test]
fn sqlite_store_saves_with_version_compare_and_set() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"), None);
    let instance = sample_instance("t-1");

    assert_eq!(store.save(&instance, 0).unwrap(), 1);
    let loaded = store.load(&instance.instance_id).unwrap().unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.thread_id, instance.thread_id);
    assert_eq!(store.save(&loaded, 1).unwrap(), 2);

    let err = store.save(&loaded, 1).unwrap_err();
    let StoreError::Conflict {
        instance_id,
        expected,
        found,
    } = &err
    else {
        panic!("expected a version conflict, got {err}");
    };
    assert_eq!(instance_id, instance.instance_id.as_str());
    assert_eq!((*expected, *found), (1, 2));
    assert!(matches!(store.save(&instance, 0).unwrap_err(), StoreError::Conflict { .. }));
}

#[test]
fn sqlite_store_enforces_max_versions() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let store = store_for(&path, Some(2));
    let instance = sample_instance("t-1");
    let mut version = 0;
    for _ in 0 .. 4 {
        version = store.save(&instance, version).unwrap();
    }
    assert_eq!(version, 4);
    assert_eq!(count_versions(&path), 2);
    assert_eq!(store.load(&instance.instance_id).unwrap().unwrap().version, 4);
}

#[test]
fn sqlite_store_lists_instances_by_thread() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"), None);
    store.save(&sample_instance("t-1"), 0).unwrap();
    store.save(&sample_instance("t-2"), 0).unwrap();

    assert_eq!(store.list_instances(None).unwrap().len(), 2);
    let only = store.list_instances(Some(&ThreadId::new("t-2"))).unwrap();
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].instance_id, sample_instance("t-2").instance_id);
    assert_eq!(only[0].latest_version, 1);
}

// ============================================================================
// SECTION: Integrity
// ============================================================================

#[test]
fn sqlite_store_detects_hash_mismatch() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let store = store_for(&path, None);
    let instance = sample_instance("t-1");
    store.save(&instance, 0).unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE wizard_instance_versions SET state_hash = 'bad' WHERE instance_id = ?1",
        params![instance.instance_id.as_str()],
    )
    .unwrap();

    let err = store.load(&instance.instance_id).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    assert!(err.to_string().contains("hash mismatch"));
}

#[test]
fn sqlite_store_rejects_unknown_hash_algorithm() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let store = store_for(&path, None);
    let instance = sample_instance("t-1");
    store.save(&instance, 0).unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute("UPDATE wizard_instance_versions SET hash_algorithm = 'md5'", params![]).unwrap();

    let err = store.load(&instance.instance_id).unwrap_err();
    assert!(err.to_string().contains("unsupported hash algorithm"));
}

#[test]
fn sqlite_store_detects_invalid_latest_version() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let store = store_for(&path, None);
    let instance = sample_instance("t-1");
    store.save(&instance, 0).unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute("UPDATE wizard_instances SET latest_version = 0", params![]).unwrap();

    let err = store.load(&instance.instance_id).unwrap_err();
    assert!(err.to_string().contains("invalid latest_version"));
}

// ============================================================================
// SECTION: Commit
// ============================================================================

#[test]
fn sqlite_store_commit_removes_instance_and_appends_outputs() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let store = store_for(&path, None);
    let instance = sample_instance("t-1");
    let version = store.save(&instance, 0).unwrap();

    store.commit(&disposition_batch(&instance, version, "m-1")).unwrap();
    assert!(store.load(&instance.instance_id).unwrap().is_none());
    assert_eq!(count_versions(&path), 0);

    let version = store.save(&instance, 0).unwrap();
    store.commit(&disposition_batch(&instance, version, "m-2")).unwrap();
    let ledger = store.ledger(&instance.thread_id).unwrap();
    let messages: Vec<&str> = ledger.dispositions.iter().map(|record| record.message_id.as_str()).collect();
    assert_eq!(messages, vec!["m-1", "m-2"]);
    assert!(ledger.records.is_empty());
    assert!(store.ledger(&ThreadId::new("t-other")).unwrap().dispositions.is_empty());
}

#[test]
fn sqlite_store_rejects_stale_commit_without_writing() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"), None);
    let instance = sample_instance("t-1");
    let version = store.save(&instance, 0).unwrap();
    let version = store.save(&instance, version).unwrap();

    let err = store.commit(&disposition_batch(&instance, version - 1, "m-1")).unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert!(store.load(&instance.instance_id).unwrap().is_some());
    assert!(store.ledger(&instance.thread_id).unwrap().dispositions.is_empty());

    let missing = sample_instance("t-2");
    let err = store.commit(&disposition_batch(&missing, 0, "m-2")).unwrap_err();
    assert!(matches!(err, StoreError::Conflict { found: 0, .. }));
}

#[test]
fn sqlite_store_supports_concurrent_saves() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(store_for(&temp.path().join("store.sqlite"), None));
    let mut handles = Vec::new();
    for i in 0 .. 4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            store.save(&sample_instance(&format!("t-{i}")), 0).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.list_instances(None).unwrap().len(), 4);
}

// ============================================================================
// SECTION: Wizard Durability
// ============================================================================

struct SingleBranch;

impl ThreadReader for SingleBranch {
    fn branches(&self, _thread_id: &ThreadId) -> Result<Vec<BranchSnapshot>, ThreadError> {
        Ok(vec![BranchSnapshot {
            branch_id: BranchId::new("b-1"),
            obligee: ObligeeRef {
                obligee_id: ObligeeId::new("o-1"),
                name: "Ministry of Finance".to_string(),
            },
            addable: [ActionType::Confirmation].into_iter().collect::<BTreeSet<_>>(),
            last_action: LastAction {
                action_type: ActionType::Request,
                legal_date: date!(2024 - 02 - 01),
                delivered_date: None,
            },
        }])
    }
}

struct EmptyDirectory;

impl ObligeeDirectory for EmptyDirectory {
    fn find_pending_by_name(&self, _name: &str) -> Result<Option<ObligeeRef>, DirectoryError> {
        Ok(None)
    }
}

struct EmptyStaging;

impl AttachmentStaging for EmptyStaging {
    fn staged(&self, _draft: &DraftRef) -> Result<Vec<AttachmentRef>, AttachmentError> {
        Ok(Vec::new())
    }
}

fn wizard_on(store: SqliteWizardStore) -> Wizard<SqliteWizardStore, SingleBranch, EmptyDirectory, EmptyStaging, NoopHelpDesk> {
    Wizard::new(
        StepCatalog::obligee_action(),
        store,
        SingleBranch,
        EmptyDirectory,
        EmptyStaging,
        NoopHelpDesk,
        WizardConfig::default(),
    )
    .unwrap()
}

fn submit(
    wizard: &Wizard<SqliteWizardStore, SingleBranch, EmptyDirectory, EmptyStaging, NoopHelpDesk>,
    instance: &WizardInstance,
    step: StepKey,
    input: serde_json::Value,
) -> StepCursor {
    let outcome = wizard
        .submit(SubmitRequest {
            instance_id: instance.instance_id.clone(),
            step,
            input: input.as_object().cloned().unwrap(),
            today: date!(2024 - 03 - 05),
        })
        .unwrap();
    match outcome {
        SubmitOutcome::Advanced(cursor) => cursor,
        SubmitOutcome::Rejected(errors) => panic!("step {step} rejected: {errors}"),
    }
}

#[test]
fn sqlite_store_resumes_flow_after_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let request = OpenRequest {
        thread_id: ThreadId::new("t-1"),
        source: InputSource::Manual,
        draft: DraftRef {
            session_id: SessionId::new("session-1"),
            draft_id: DraftId::new("draft-1"),
        },
    };

    let wizard = wizard_on(store_for(&path, None));
    let instance = wizard.open(request.clone()).unwrap();
    submit(&wizard, &instance, StepKey::Basics, json!({"branch": "b-1", "delivered_date": "2024-03-01"}));
    drop(wizard);

    let wizard = wizard_on(store_for(&path, None));
    let resumed = wizard.open(request).unwrap();
    assert_eq!(resumed.completed(), vec![StepKey::Basics]);
    assert_eq!(wizard.resolve_current_step(&resumed.instance_id).unwrap(), StepCursor::Step(StepKey::IsConfirmation));
    submit(&wizard, &resumed, StepKey::IsConfirmation, json!({"is_confirmation": true}));
    submit(&wizard, &resumed, StepKey::Categorized, json!({"legal_date": "2024-03-01"}));

    let CommitOutcome::Action {
        record, ..
    } = wizard.commit(&resumed.instance_id).unwrap()
    else {
        panic!("expected an action outcome");
    };
    assert_eq!(record.action, ActionType::Confirmation);
    let ledger = wizard.ledger(&ThreadId::new("t-1")).unwrap();
    assert_eq!(ledger.records, vec![record]);
    assert!(wizard.store().load(&resumed.instance_id).unwrap().is_none());
}

fn commit_confirmation(
    wizard: &Wizard<SqliteWizardStore, SingleBranch, EmptyDirectory, EmptyStaging, NoopHelpDesk>,
    thread: &str,
) -> ClassificationRecord {
    let instance = wizard
        .open(OpenRequest {
            thread_id: ThreadId::new(thread),
            source: InputSource::Manual,
            draft: DraftRef {
                session_id: SessionId::new("session-1"),
                draft_id: DraftId::new("draft-1"),
            },
        })
        .unwrap();
    submit(wizard, &instance, StepKey::Basics, json!({"branch": "b-1", "delivered_date": "2024-03-01"}));
    submit(wizard, &instance, StepKey::IsConfirmation, json!({"is_confirmation": true}));
    submit(wizard, &instance, StepKey::Categorized, json!({"legal_date": "2024-03-01"}));
    let CommitOutcome::Action {
        record, ..
    } = wizard.commit(&instance.instance_id).unwrap()
    else {
        panic!("expected an action outcome for {thread}");
    };
    record
}

#[test]
fn sqlite_store_commits_identical_answers_on_distinct_threads() {
    let temp = TempDir::new().unwrap();
    let wizard = wizard_on(store_for(&temp.path().join("store.sqlite"), None));

    let first = commit_confirmation(&wizard, "t-1");
    let second = commit_confirmation(&wizard, "t-2");

    assert_eq!(first.state_hash, second.state_hash);
    assert_ne!(first.record_id, second.record_id);
    assert_eq!(wizard.ledger(&ThreadId::new("t-1")).unwrap().records, vec![first]);
    assert_eq!(wizard.ledger(&ThreadId::new("t-2")).unwrap().records, vec![second]);
}

#[test]
fn sqlite_store_rejects_duplicate_record_without_writing() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"), None);
    let wizard = wizard_on(store.clone());
    let committed = commit_confirmation(&wizard, "t-1");

    let instance = sample_instance("t-3");
    store.save(&instance, 0).unwrap();
    let mut batch = disposition_batch(&instance, 1, "m-3");
    batch.record = Some(committed.clone());

    let err = store.commit(&batch).unwrap_err();
    let StoreError::DuplicateRecord(record_id) = &err else {
        panic!("expected duplicate record, got {err:?}");
    };
    assert_eq!(record_id, committed.record_id.as_str());
    assert!(store.load(&instance.instance_id).unwrap().is_some());
    let ledger = store.ledger(&ThreadId::new("t-3")).unwrap();
    assert!(ledger.records.is_empty());
    assert!(ledger.dispositions.is_empty());
}
