// crates/reply-triage-core/src/core/mod.rs
// ============================================================================
// Module: Reply Triage Core Types
// Description: Domain model, accumulated state, forms, and hashing.
// Purpose: Provide stable, serializable types shared by the runtime and stores.
// Dependencies: serde, serde_json, time, smallvec
// ============================================================================

//! ## Overview
//! Core types describe what the wizard reads (branch snapshots, sources),
//! what it accumulates (typed state keyed by [`StateKey`]), and what it
//! produces (classification records, backfills, dispositions). They carry no
//! behavior beyond validation helpers and are the canonical serialized form
//! written by every store.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod dates;
pub mod form;
pub mod hashing;
pub mod identifiers;
pub mod instance;
pub mod model;
pub mod requirement;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dates::ReplyDateWindow;
pub use form::Choice;
pub use form::ErrorCode;
pub use form::FieldKind;
pub use form::FieldSpec;
pub use form::FormReader;
pub use form::RawInput;
pub use form::ValidationErrors;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::AttachmentId;
pub use identifiers::BranchId;
pub use identifiers::DraftId;
pub use identifiers::InstanceId;
pub use identifiers::MessageId;
pub use identifiers::ObligeeId;
pub use identifiers::RecordId;
pub use identifiers::SessionId;
pub use identifiers::ThreadId;
pub use identifiers::WizardKind;
pub use instance::CompletedStep;
pub use instance::DraftRef;
pub use instance::StepKey;
pub use instance::UnknownStepKey;
pub use instance::WizardInstance;
pub use model::Acceptance;
pub use model::ActionType;
pub use model::AttachmentRef;
pub use model::BranchSnapshot;
pub use model::ClassificationRecord;
pub use model::DeliveredDateBackfill;
pub use model::DisclosureLevel;
pub use model::DispositionRecord;
pub use model::InputSource;
pub use model::LastAction;
pub use model::MessageDisposition;
pub use model::MessageSnapshot;
pub use model::ObligeeRef;
pub use model::RefusalReason;
pub use model::ResultKind;
pub use model::SourceKind;
pub use requirement::PredicateEval;
pub use requirement::Requirement;
pub use state::AccumulatedState;
pub use state::StateKey;
pub use state::StatePatch;
pub use state::StateValue;
