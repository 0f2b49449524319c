// crates/reply-triage-core/src/lib.rs
// ============================================================================
// Module: Reply Triage Core Library
// Description: Public API surface for the obligee reply classification wizard.
// Purpose: Expose core types, collaborator interfaces, and the wizard runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Reply triage core classifies an obligee's reply to an information request
//! by walking a fixed, data-dependent tree of questions. It accumulates
//! answers into typed state, supports rewinding, and commits exactly one
//! outcome atomically: a typed action record, a help request, or an
//! unrelated tag. It is storage-agnostic and reads the request thread only
//! through explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::AttachmentError;
pub use interfaces::AttachmentStaging;
pub use interfaces::CommitBatch;
pub use interfaces::DirectoryError;
pub use interfaces::HelpDesk;
pub use interfaces::HelpDeskError;
pub use interfaces::HelpRequest;
pub use interfaces::NoopHelpDesk;
pub use interfaces::ObligeeDirectory;
pub use interfaces::StoreError;
pub use interfaces::ThreadError;
pub use interfaces::ThreadLedger;
pub use interfaces::ThreadReader;
pub use interfaces::WizardStore;
pub use runtime::AuditOutcome;
pub use runtime::CatalogError;
pub use runtime::CommitOutcome;
pub use runtime::DEFAULT_BASE_PATH;
pub use runtime::FileAuditSink;
pub use runtime::InMemoryWizardStore;
pub use runtime::MemoryAuditSink;
pub use runtime::NoopAuditSink;
pub use runtime::OpenRequest;
pub use runtime::Resolution;
pub use runtime::StderrAuditSink;
pub use runtime::StepCatalog;
pub use runtime::StepCursor;
pub use runtime::StepDefinition;
pub use runtime::StepView;
pub use runtime::SubmitOutcome;
pub use runtime::SubmitRequest;
pub use runtime::ValidationSettings;
pub use runtime::Wizard;
pub use runtime::WizardAuditEvent;
pub use runtime::WizardAuditSink;
pub use runtime::WizardConfig;
pub use runtime::WizardError;
pub use runtime::parse_step_address;
pub use runtime::step_address;
