// crates/reply-triage-core/src/interfaces/mod.rs
// ============================================================================
// Module: Reply Triage Interfaces
// Description: Backend-agnostic collaborators and the wizard store contract.
// Purpose: Define the surfaces the wizard reads threads, obligees, and uploads through.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The wizard never owns the request thread, the obligee registry, staged
//! uploads, or a ticketing system. It reads them through the traits in this
//! module and writes only through [`WizardStore::commit`]. Implementations
//! must fail closed: a collaborator that cannot answer returns an error, it
//! never guesses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AttachmentRef;
use crate::core::BranchId;
use crate::core::BranchSnapshot;
use crate::core::ClassificationRecord;
use crate::core::DeliveredDateBackfill;
use crate::core::DispositionRecord;
use crate::core::DraftRef;
use crate::core::InstanceId;
use crate::core::ObligeeRef;
use crate::core::ThreadId;
use crate::core::WizardInstance;

// ============================================================================
// SECTION: Request Thread
// ============================================================================

/// Request thread read errors.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// The thread does not exist.
    #[error("request thread not found: {0}")]
    NotFound(String),
    /// The thread source reported an error.
    #[error("request thread error: {0}")]
    Source(String),
}

/// Read-only view of request threads and their branches.
pub trait ThreadReader {
    /// Returns the current branches of a thread.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError`] when the thread cannot be read.
    fn branches(&self, thread_id: &ThreadId) -> Result<Vec<BranchSnapshot>, ThreadError>;

    /// Returns one branch of a thread as it is now.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError`] when the thread cannot be read.
    fn branch(
        &self,
        thread_id: &ThreadId,
        branch_id: &BranchId,
    ) -> Result<Option<BranchSnapshot>, ThreadError> {
        Ok(self.branches(thread_id)?.into_iter().find(|branch| &branch.branch_id == branch_id))
    }
}

// ============================================================================
// SECTION: Obligee Directory
// ============================================================================

/// Obligee directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory reported an error.
    #[error("obligee directory error: {0}")]
    Source(String),
}

/// Lookup of obligees that can still receive requests.
pub trait ObligeeDirectory {
    /// Resolves a pending (not dissolved) obligee by exact name.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory cannot be queried.
    fn find_pending_by_name(&self, name: &str) -> Result<Option<ObligeeRef>, DirectoryError>;
}

// ============================================================================
// SECTION: Attachment Staging
// ============================================================================

/// Attachment staging errors.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// The staging area reported an error.
    #[error("attachment staging error: {0}")]
    Source(String),
}

/// Uploads staged against a draft holder.
pub trait AttachmentStaging {
    /// Lists attachments staged for the draft holder.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError`] when the staging area cannot be read.
    fn staged(&self, draft: &DraftRef) -> Result<Vec<AttachmentRef>, AttachmentError>;
}

// ============================================================================
// SECTION: Help Desk
// ============================================================================

/// Help desk errors.
#[derive(Debug, Error)]
pub enum HelpDeskError {
    /// The help desk rejected or failed the request.
    #[error("help desk error: {0}")]
    Source(String),
}

/// Free-text help request filed when a reply cannot be classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpRequest {
    /// Thread the request concerns.
    pub thread_id: ThreadId,
    /// Stable key of the commit attempt, `{instance_id}@{version}`.
    pub request_key: String,
    /// Free-text request.
    pub text: String,
}

/// Receiver of free-text help requests.
///
/// Requests are filed before the store commit, so delivery is at least once:
/// a commit retried after a store failure files the same request again with
/// the same `request_key`. Implementations should treat a repeated key as
/// already filed.
pub trait HelpDesk {
    /// Files a help request.
    ///
    /// # Errors
    ///
    /// Returns [`HelpDeskError`] when the request cannot be filed.
    fn submit_help_request(&self, request: &HelpRequest) -> Result<(), HelpDeskError>;
}

/// Help desk that accepts and discards every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHelpDesk;

impl HelpDesk for NoopHelpDesk {
    fn submit_help_request(&self, _request: &HelpRequest) -> Result<(), HelpDeskError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Wizard Store
// ============================================================================

/// Wizard store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("wizard store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("wizard store corruption: {0}")]
    Corrupt(String),
    /// The stored version differs from the caller's expectation.
    #[error("wizard store conflict for {instance_id}: expected version {expected}, found {found}")]
    Conflict {
        /// Instance that was written concurrently.
        instance_id: String,
        /// Version the caller loaded.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },
    /// Store data is invalid.
    #[error("wizard store invalid data: {0}")]
    Invalid(String),
    /// A classification record with the same identifier is already committed.
    #[error("wizard store already holds record {0}")]
    DuplicateRecord(String),
    /// Store reported an error.
    #[error("wizard store error: {0}")]
    Store(String),
}

/// Everything a commit writes, applied as one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitBatch {
    /// Instance being finalized and removed.
    pub instance_id: InstanceId,
    /// Version the instance was loaded at.
    pub expected_version: u64,
    /// Thread the outputs belong to.
    pub thread_id: ThreadId,
    /// Classification record, for action results.
    pub record: Option<ClassificationRecord>,
    /// Delivered-date backfill onto the branch's last action.
    pub backfill: Option<DeliveredDateBackfill>,
    /// Source message disposition, for message sources.
    pub disposition: Option<DispositionRecord>,
}

/// Committed outputs of one thread, in commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadLedger {
    /// Classification records.
    pub records: Vec<ClassificationRecord>,
    /// Delivered-date backfills.
    pub backfills: Vec<DeliveredDateBackfill>,
    /// Message dispositions.
    pub dispositions: Vec<DispositionRecord>,
}

/// Persistence for wizard instances and committed outputs.
///
/// # Invariants
/// - `save` is a compare-and-set on the instance version: it succeeds only if
///   the stored version equals `expected_version` (zero when absent).
/// - `commit` applies every part of the batch or none of it, and removes the
///   instance in the same transaction.
pub trait WizardStore {
    /// Loads an instance by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails or the stored data is corrupt.
    fn load(&self, instance_id: &InstanceId) -> Result<Option<WizardInstance>, StoreError>;

    /// Saves an instance, returning its new version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a version mismatch and other
    /// [`StoreError`] variants when saving fails.
    fn save(&self, instance: &WizardInstance, expected_version: u64) -> Result<u64, StoreError>;

    /// Atomically writes commit outputs and removes the instance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails; nothing is applied.
    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError>;

    /// Reads back committed outputs for a thread.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn ledger(&self, thread_id: &ThreadId) -> Result<ThreadLedger, StoreError>;

    /// Reports store readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
