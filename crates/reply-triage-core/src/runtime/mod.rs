// crates/reply-triage-core/src/runtime/mod.rs
// ============================================================================
// Module: Reply Triage Runtime
// Description: Step catalog, wizard driver, commit adapter, and helpers.
// Purpose: Classify obligee replies by walking the step catalog against a store.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement step behaviors, the ordered catalog and its
//! resolver, the wizard driver, commit assembly, audit sinks, and step
//! addressing. Every host surface calls the same [`Wizard`] so resolution and
//! validation behave identically everywhere.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod catalog;
pub mod commit;
pub mod engine;
pub mod navigation;
pub mod steps;
pub mod store;
pub mod validators;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditOutcome;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::WizardAuditEvent;
pub use audit::WizardAuditSink;
pub use catalog::Applicability;
pub use catalog::CatalogError;
pub use catalog::Resolution;
pub use catalog::StatePredicate;
pub use catalog::StepCatalog;
pub use catalog::StepDefinition;
pub use commit::CommitError;
pub use commit::CommitOutcome;
pub use engine::OpenRequest;
pub use engine::StepCursor;
pub use engine::StepView;
pub use engine::SubmitOutcome;
pub use engine::SubmitRequest;
pub use engine::Wizard;
pub use engine::WizardConfig;
pub use engine::WizardError;
pub use navigation::DEFAULT_BASE_PATH;
pub use navigation::parse_step_address;
pub use navigation::step_address;
pub use steps::StepBehavior;
pub use store::InMemoryWizardStore;
pub use validators::CleanError;
pub use validators::CleanedInput;
pub use validators::StepContext;
pub use validators::ValidationSettings;
