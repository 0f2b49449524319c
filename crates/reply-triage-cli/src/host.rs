// crates/reply-triage-cli/src/host.rs
// ============================================================================
// Module: Host Wiring
// Description: Builds stores, audit sinks, and wizards from configuration.
// Purpose: Turn a validated TriageConfig into a ready-to-drive wizard.
// Dependencies: reply-triage-config, reply-triage-core, reply-triage-store-sqlite
// ============================================================================

//! ## Overview
//! [`HostStore`] lets one wizard type run over either backend selected in
//! configuration. [`JsonlHelpDesk`] files help requests as JSON lines so a
//! human can pick them up; it is the only collaborator the CLI writes to
//! besides the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use reply_triage_config::AuditSinkType;
use reply_triage_config::StoreType;
use reply_triage_config::TriageConfig;
use reply_triage_core::CommitBatch;
use reply_triage_core::FileAuditSink;
use reply_triage_core::HelpDesk;
use reply_triage_core::HelpDeskError;
use reply_triage_core::HelpRequest;
use reply_triage_core::InMemoryWizardStore;
use reply_triage_core::InstanceId;
use reply_triage_core::NoopAuditSink;
use reply_triage_core::StderrAuditSink;
use reply_triage_core::StepCatalog;
use reply_triage_core::StoreError;
use reply_triage_core::ThreadId;
use reply_triage_core::ThreadLedger;
use reply_triage_core::Wizard;
use reply_triage_core::WizardAuditSink;
use reply_triage_core::WizardError;
use reply_triage_core::WizardInstance;
use reply_triage_core::WizardStore;
use reply_triage_store_sqlite::InstanceSummary;
use reply_triage_store_sqlite::SqliteStoreError;
use reply_triage_store_sqlite::SqliteWizardStore;
use thiserror::Error;

use crate::fixture::FixtureDirectory;
use crate::fixture::FixtureStaging;
use crate::fixture::FixtureThreads;
use crate::fixture::ThreadFixture;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Host wiring failures.
#[derive(Debug, Error)]
pub enum HostError {
    /// The store could not be opened.
    #[error("store setup failed: {0}")]
    Store(#[from] SqliteStoreError),
    /// The audit sink could not be opened.
    #[error("audit sink setup failed: {0}")]
    Audit(String),
    /// The wizard rejected its catalog.
    #[error(transparent)]
    Wizard(#[from] WizardError),
    /// The operation needs a durable store.
    #[error("{0} requires the sqlite store")]
    NotDurable(&'static str),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Wizard store selected by configuration.
#[derive(Clone)]
pub enum HostStore {
    /// Process-local store.
    Memory(InMemoryWizardStore),
    /// Durable `SQLite` store.
    Sqlite(SqliteWizardStore),
}

impl HostStore {
    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Store`] when the sqlite store cannot be opened.
    pub fn open(config: &TriageConfig) -> Result<Self, HostError> {
        match (config.store.store_type, config.store.sqlite_config()) {
            (StoreType::Sqlite, Some(sqlite)) => Ok(Self::Sqlite(SqliteWizardStore::new(sqlite)?)),
            (StoreType::Sqlite, None) => {
                Err(HostError::Store(SqliteStoreError::Invalid("sqlite store requires path".to_string())))
            }
            (StoreType::Memory, _) => Ok(Self::Memory(InMemoryWizardStore::new())),
        }
    }

    /// Returns true when instances survive the process.
    #[must_use]
    pub const fn is_durable(&self) -> bool {
        matches!(self, Self::Sqlite(_))
    }

    /// Lists stored instances, optionally for one thread.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotDurable`] for the memory store and
    /// [`HostError::Store`] when the listing fails.
    pub fn list_instances(&self, thread_id: Option<&ThreadId>) -> Result<Vec<InstanceSummary>, HostError> {
        match self {
            Self::Memory(_) => Err(HostError::NotDurable("listing instances")),
            Self::Sqlite(store) => Ok(store.list_instances(thread_id)?),
        }
    }
}

impl WizardStore for HostStore {
    fn load(&self, instance_id: &InstanceId) -> Result<Option<WizardInstance>, StoreError> {
        match self {
            Self::Memory(store) => store.load(instance_id),
            Self::Sqlite(store) => store.load(instance_id),
        }
    }

    fn save(&self, instance: &WizardInstance, expected_version: u64) -> Result<u64, StoreError> {
        match self {
            Self::Memory(store) => store.save(instance, expected_version),
            Self::Sqlite(store) => store.save(instance, expected_version),
        }
    }

    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.commit(batch),
            Self::Sqlite(store) => store.commit(batch),
        }
    }

    fn ledger(&self, thread_id: &ThreadId) -> Result<ThreadLedger, StoreError> {
        match self {
            Self::Memory(store) => store.ledger(thread_id),
            Self::Sqlite(store) => store.ledger(thread_id),
        }
    }

    fn readiness(&self) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.readiness(),
            Self::Sqlite(store) => store.readiness(),
        }
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Builds the configured audit sink.
///
/// # Errors
///
/// Returns [`HostError::Audit`] when the audit file cannot be opened.
pub fn audit_sink(config: &TriageConfig) -> Result<Arc<dyn WizardAuditSink>, HostError> {
    match (config.audit.sink, config.audit.path.as_deref()) {
        (AuditSinkType::File, Some(path)) => {
            let sink = FileAuditSink::new(Path::new(path.trim())).map_err(|err| HostError::Audit(err.to_string()))?;
            Ok(Arc::new(sink))
        }
        (AuditSinkType::File, None) => Err(HostError::Audit("file audit sink requires path".to_string())),
        (AuditSinkType::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
        (AuditSinkType::None, _) => Ok(Arc::new(NoopAuditSink)),
    }
}

// ============================================================================
// SECTION: Help Desk
// ============================================================================

/// Help desk that appends requests to a JSON-lines file.
///
/// A request whose key is already in the file is not written again.
#[derive(Debug, Clone)]
pub struct JsonlHelpDesk {
    /// Request log path.
    path: PathBuf,
}

impl JsonlHelpDesk {
    /// Creates a help desk writing to `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
        }
    }
}

impl JsonlHelpDesk {
    /// Returns true when a request with `request_key` was already filed.
    fn already_filed(&self, request_key: &str) -> Result<bool, HelpDeskError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(HelpDeskError::Source(err.to_string())),
        };
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str::<HelpRequest>(line).ok())
            .any(|filed| filed.request_key == request_key))
    }
}

impl HelpDesk for JsonlHelpDesk {
    fn submit_help_request(&self, request: &HelpRequest) -> Result<(), HelpDeskError> {
        if self.already_filed(&request.request_key)? {
            return Ok(());
        }
        let line = serde_json::to_string(request).map_err(|err| HelpDeskError::Source(err.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| HelpDeskError::Source(err.to_string()))?;
        writeln!(file, "{line}").map_err(|err| HelpDeskError::Source(err.to_string()))
    }
}

// ============================================================================
// SECTION: Wizard
// ============================================================================

/// Wizard type driven by the CLI.
pub type HostWizard = Wizard<HostStore, FixtureThreads, FixtureDirectory, FixtureStaging, JsonlHelpDesk>;

/// Builds a wizard over the configured store and audit sink.
///
/// # Errors
///
/// Returns [`HostError`] when the store, audit sink, or catalog is unusable.
pub fn build_wizard(
    config: &TriageConfig,
    fixture: ThreadFixture,
    help_desk: JsonlHelpDesk,
) -> Result<HostWizard, HostError> {
    let store = HostStore::open(config)?;
    let audit = audit_sink(config)?;
    let (threads, obligees, staging) = fixture.into_parts();
    let wizard = Wizard::new(
        StepCatalog::obligee_action(),
        store,
        threads,
        obligees,
        staging,
        help_desk,
        config.wizard_config(),
    )?;
    Ok(wizard.with_audit_sink(audit))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    /// Help request for thread `t-1`.
    fn request(key: &str, text: &str) -> HelpRequest {
        HelpRequest {
            thread_id: ThreadId::new("t-1"),
            request_key: key.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn memory_store_is_not_durable() {
        let store = HostStore::open(&TriageConfig::default()).unwrap();
        assert!(!store.is_durable());
        assert!(matches!(store.list_instances(None), Err(HostError::NotDurable(_))));
    }

    #[test]
    fn help_desk_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("help.jsonl");
        let desk = JsonlHelpDesk::new(path.clone());
        desk.submit_help_request(&request("i@1", "first")).unwrap();
        desk.submit_help_request(&request("i@2", "second")).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> =
            content.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["text"], "second");
        assert_eq!(lines[0]["thread_id"], "t-1");
        assert_eq!(lines[0]["request_key"], "i@1");
    }

    #[test]
    fn help_desk_skips_already_filed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("help.jsonl");
        let desk = JsonlHelpDesk::new(path.clone());
        desk.submit_help_request(&request("i@3", "first")).unwrap();
        desk.submit_help_request(&request("i@3", "first")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn help_desk_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let desk = JsonlHelpDesk::new(dir.path().to_path_buf());
        assert!(desk.submit_help_request(&request("i@1", "text")).is_err());
    }
}
