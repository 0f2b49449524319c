// crates/reply-triage-core/src/runtime/commit.rs
// ============================================================================
// Module: Commit Adapter
// Description: Terminal-state assertions and commit batch assembly.
// Purpose: Turn a terminal accumulated state into the outputs of one atomic commit.
// Dependencies: thiserror, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The commit adapter is pure: the driver gathers live collaborator data (the
//! branch as it is now, re-resolved staged uploads) and this module asserts
//! the terminal state is consistent and assembles a [`CommitBatch`]. Any
//! violated assertion is a [`CommitError::Precondition`]; it indicates a
//! step/guard mismatch, never a user error.
//!
//! Record identifiers are derived from the canonical hash of the instance
//! identifier, the input source, and the terminal state hash. Replaying the
//! same answers for the same reply yields the same record; identical answers
//! on different threads or messages yield distinct records.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AccumulatedState;
use crate::core::ActionType;
use crate::core::AttachmentRef;
use crate::core::BranchSnapshot;
use crate::core::ClassificationRecord;
use crate::core::DeliveredDateBackfill;
use crate::core::DispositionRecord;
use crate::core::HashAlgorithm;
use crate::core::HashDigest;
use crate::core::HashError;
use crate::core::InputSource;
use crate::core::InstanceId;
use crate::core::MessageDisposition;
use crate::core::RecordId;
use crate::core::ResultKind;
use crate::core::StateKey;
use crate::core::WizardInstance;
use crate::core::hashing::hash_canonical_json;
use crate::interfaces::CommitBatch;
use crate::interfaces::HelpRequest;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Hex characters of the identity hash used in record identifiers.
const RECORD_ID_HASH_CHARS: usize = 16;

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// A classification record was created.
    Action {
        /// Created record.
        record: ClassificationRecord,
        /// Backfill applied to the branch's prior action.
        backfill: Option<DeliveredDateBackfill>,
    },
    /// A help request was filed.
    Help,
    /// The reply was marked unrelated.
    Unrelated,
}

/// Commit assembly errors.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The terminal state is inconsistent.
    #[error("commit precondition failed: {0}")]
    Precondition(String),
    /// Terminal state hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Hashed input of a record identifier.
#[derive(Serialize)]
struct RecordIdentity<'a> {
    /// Instance the record is committed from.
    instance_id: &'a InstanceId,
    /// Input source of the reply.
    source: &'a InputSource,
    /// Hash of the terminal state.
    state_hash: &'a HashDigest,
}

/// Shorthand for a precondition failure.
fn precondition(message: impl Into<String>) -> CommitError {
    CommitError::Precondition(message.into())
}

// ============================================================================
// SECTION: Assertions
// ============================================================================

/// Requires the settled result to equal `expected`.
///
/// # Errors
///
/// Returns [`CommitError::Precondition`] on a mismatch.
pub fn require_result(state: &AccumulatedState, expected: ResultKind) -> Result<(), CommitError> {
    match state.result() {
        Some(result) if result == expected => Ok(()),
        Some(result) => Err(precondition(format!(
            "result is {}, expected {}",
            result.as_str(),
            expected.as_str()
        ))),
        None => Err(precondition("no result settled")),
    }
}

/// Checks the settled action against the action type sets and the live branch.
fn check_action(action: ActionType, source: &InputSource, live: &BranchSnapshot) -> Result<(), CommitError> {
    if !action.is_obligee_action() {
        return Err(precondition(format!("{} is not an obligee action", action.as_str())));
    }
    if source.message().is_some() && !action.is_message_action() {
        return Err(precondition(format!("{} cannot be produced from a message", action.as_str())));
    }
    if !live.can_add(action) {
        return Err(precondition(format!(
            "branch {} no longer accepts {}",
            live.branch_id,
            action.as_str()
        )));
    }
    Ok(())
}

/// Disposition written onto a message source.
fn disposition(source: &InputSource, disposition: MessageDisposition) -> Option<DispositionRecord> {
    source.message().map(|message| DispositionRecord {
        message_id: message.message_id.clone(),
        disposition,
    })
}

// ============================================================================
// SECTION: Batches
// ============================================================================

/// Assembles the batch for an action result.
///
/// `live` is the branch as it is now; `staged` are the re-resolved staged
/// uploads for manual sources and ignored for message sources.
///
/// # Errors
///
/// Returns [`CommitError`] when the state is inconsistent or cannot be hashed.
pub fn action_batch(
    instance: &WizardInstance,
    live: &BranchSnapshot,
    staged: Vec<AttachmentRef>,
    algorithm: HashAlgorithm,
) -> Result<CommitBatch, CommitError> {
    let state = instance.state();
    require_result(state, ResultKind::Action)?;
    let action = state.action().ok_or_else(|| precondition("action result without an action type"))?;
    let captured = state.branch().ok_or_else(|| precondition("no branch captured"))?;
    if captured.branch_id != live.branch_id {
        return Err(precondition("live branch does not match the captured branch"));
    }
    check_action(action, &instance.source, live)?;

    let delivered_date =
        state.date(StateKey::DeliveredDate).ok_or_else(|| precondition("no delivered date"))?;
    let legal_date = state.date(StateKey::LegalDate).ok_or_else(|| precondition("no legal date"))?;

    let backfill = match state.date(StateKey::LastActionDeliveredDate) {
        Some(date) => {
            let (previous, now) = (&captured.last_action, &live.last_action);
            if previous.action_type != now.action_type || previous.legal_date != now.legal_date {
                return Err(precondition("branch's last action changed since basics"));
            }
            now.delivered_date.is_none().then(|| DeliveredDateBackfill {
                branch_id: live.branch_id.clone(),
                action_type: now.action_type,
                delivered_date: date,
            })
        }
        None => None,
    };

    let state_hash = hash_canonical_json(algorithm, state)?;
    let identity = hash_canonical_json(
        algorithm,
        &RecordIdentity {
            instance_id: &instance.instance_id,
            source: &instance.source,
            state_hash: &state_hash,
        },
    )?;
    let record_id = RecordId::new(format!("rec-{}", identity.short(RECORD_ID_HASH_CHARS)));
    let (message_id, subject, content, attachments) = match &instance.source {
        InputSource::Message(message) => (
            Some(message.message_id.clone()),
            message.subject.clone(),
            message.text.clone(),
            message.attachments.clone(),
        ),
        InputSource::Manual => (None, String::new(), String::new(), staged),
    };

    let record = ClassificationRecord {
        record_id,
        thread_id: instance.thread_id.clone(),
        branch_id: live.branch_id.clone(),
        action,
        message_id,
        subject,
        content,
        file_number: state.text(StateKey::FileNumber).unwrap_or_default().to_string(),
        delivered_date,
        legal_date,
        extension: state.extension(),
        disclosure_level: state.disclosure_level(),
        refusal_reasons: state.refusal_reasons().map(<[_]>::to_vec),
        advanced_to: state.advanced_to().map(<[_]>::to_vec),
        attachments,
        state_hash,
    };

    Ok(CommitBatch {
        instance_id: instance.instance_id.clone(),
        expected_version: instance.version,
        thread_id: instance.thread_id.clone(),
        record: Some(record),
        backfill,
        disposition: disposition(&instance.source, MessageDisposition::ObligeeAction),
    })
}

/// Assembles the batch for a help result and the request to file.
///
/// The request key names the instance version being committed, so a retry of
/// the same commit carries the same key.
///
/// # Errors
///
/// Returns [`CommitError::Precondition`] when the state is not a help result.
pub fn help_batch(instance: &WizardInstance) -> Result<(CommitBatch, HelpRequest), CommitError> {
    let state = instance.state();
    require_result(state, ResultKind::Help)?;
    let text = state.text(StateKey::HelpRequest).ok_or_else(|| precondition("help result without help text"))?;
    let request = HelpRequest {
        thread_id: instance.thread_id.clone(),
        request_key: format!("{}@{}", instance.instance_id, instance.version),
        text: text.to_string(),
    };
    Ok((bookkeeping_batch(instance, MessageDisposition::Unknown), request))
}

/// Assembles the batch for an unrelated result.
///
/// # Errors
///
/// Returns [`CommitError::Precondition`] when the state is not an unrelated result.
pub fn unrelated_batch(instance: &WizardInstance) -> Result<CommitBatch, CommitError> {
    require_result(instance.state(), ResultKind::Unrelated)?;
    Ok(bookkeeping_batch(instance, MessageDisposition::Unrelated))
}

/// Batch that only removes the instance and tags the source message.
fn bookkeeping_batch(instance: &WizardInstance, tag: MessageDisposition) -> CommitBatch {
    CommitBatch {
        instance_id: instance.instance_id.clone(),
        expected_version: instance.version,
        thread_id: instance.thread_id.clone(),
        record: None,
        backfill: None,
        disposition: disposition(&instance.source, tag),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
