// crates/reply-triage-core/src/runtime/engine.rs
// ============================================================================
// Module: Wizard Driver
// Description: Opens, advances, rewinds, and commits classification flows.
// Purpose: Orchestrate step resolution, validation, state merges, and persistence.
// Dependencies: serde, thiserror, time, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The [`Wizard`] is the only entry point hosts call. Every operation loads
//! the instance, recomputes the current step from the catalog, and refuses
//! to act on any other step. Accepted input is merged into a new snapshot and
//! saved with a compare-and-set on the instance version; rejected input is
//! returned as field errors and leaves the instance untouched.
//!
//! Security posture: submitted values are untrusted. They are validated by
//! the step's cleaner, never logged, and never reach the store unless the
//! step accepted them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;

use crate::core::AccumulatedState;
use crate::core::AttachmentId;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::DraftRef;
use crate::core::FieldSpec;
use crate::core::HashAlgorithm;
use crate::core::HashError;
use crate::core::InputSource;
use crate::core::InstanceId;
use crate::core::RawInput;
use crate::core::ResultKind;
use crate::core::StepKey;
use crate::core::ThreadId;
use crate::core::ValidationErrors;
use crate::core::WizardInstance;
use crate::core::WizardKind;
use crate::interfaces::AttachmentError;
use crate::interfaces::AttachmentStaging;
use crate::interfaces::DirectoryError;
use crate::interfaces::HelpDesk;
use crate::interfaces::HelpDeskError;
use crate::interfaces::ObligeeDirectory;
use crate::interfaces::StoreError;
use crate::interfaces::ThreadError;
use crate::interfaces::ThreadLedger;
use crate::interfaces::ThreadReader;
use crate::interfaces::WizardStore;
use crate::runtime::audit::AuditOutcome;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::WizardAuditEvent;
use crate::runtime::audit::WizardAuditSink;
use crate::runtime::catalog::CatalogError;
use crate::runtime::catalog::Resolution;
use crate::runtime::catalog::StepCatalog;
use crate::runtime::catalog::StepDefinition;
use crate::runtime::commit;
use crate::runtime::commit::CommitError;
use crate::runtime::commit::CommitOutcome;
use crate::runtime::validators::CleanError;
use crate::runtime::validators::StepContext;
use crate::runtime::validators::ValidationSettings;
use crate::runtime::validators::resolve_staged;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Wizard driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardConfig {
    /// Validation settings passed to every step.
    pub settings: ValidationSettings,
    /// Hash algorithm for terminal state hashes and record identifiers.
    pub hash_algorithm: HashAlgorithm,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            settings: ValidationSettings::default(),
            hash_algorithm: DEFAULT_HASH_ALGORITHM,
        }
    }
}

// ============================================================================
// SECTION: Requests and Results
// ============================================================================

/// Request to open (create or resume) a flow for a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    /// Thread the reply belongs to.
    pub thread_id: ThreadId,
    /// Input source of the reply.
    pub source: InputSource,
    /// Draft holder for staged attachments.
    pub draft: DraftRef,
}

/// Request to submit input for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Target instance.
    pub instance_id: InstanceId,
    /// Step the input was collected for.
    pub step: StepKey,
    /// Raw submitted fields.
    pub input: RawInput,
    /// Local calendar day of the submission.
    pub today: Date,
}

/// Current position of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepCursor {
    /// The step to present next.
    Step(StepKey),
    /// The flow is complete with this result.
    Terminal(ResultKind),
}

impl fmt::Display for StepCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(step) => write!(f, "step {step}"),
            Self::Terminal(result) => write!(f, "terminal {}", result.as_str()),
        }
    }
}

impl From<Resolution> for StepCursor {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Step {
                step,
            } => Self::Step(step),
            Resolution::Terminal {
                result,
            } => Self::Terminal(result),
        }
    }
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Input accepted; the flow moved to the cursor.
    Advanced(StepCursor),
    /// Input rejected with field errors; nothing changed.
    Rejected(ValidationErrors),
}

/// Everything a host needs to render the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepView {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Step to render.
    pub step: StepKey,
    /// Declared fields.
    pub fields: Vec<FieldSpec>,
    /// Accumulated state snapshot.
    pub state: AccumulatedState,
    /// Answered steps in order.
    pub completed: Vec<StepKey>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Wizard driver errors.
#[derive(Debug, Error)]
pub enum WizardError {
    /// The requested step is not the current one.
    #[error("stale step {requested}: current position is {current}")]
    StaleStep {
        /// Step the caller targeted.
        requested: StepKey,
        /// Resolved current position.
        current: StepCursor,
    },
    /// No step applies to a non-terminal state.
    #[error("step resolution failed: {0}")]
    StepResolution(String),
    /// Commit found an inconsistent terminal state.
    #[error("commit precondition failed: {0}")]
    CommitPrecondition(String),
    /// No instance exists under the identifier.
    #[error("wizard instance not found: {0}")]
    NotFound(InstanceId),
    /// The catalog is structurally invalid.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Thread read failed.
    #[error(transparent)]
    Thread(#[from] ThreadError),
    /// Obligee directory failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// Attachment staging failed.
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    /// Help desk failed.
    #[error(transparent)]
    HelpDesk(#[from] HelpDeskError),
    /// Terminal state hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl WizardError {
    /// Returns a stable label for audit logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StaleStep {
                ..
            } => "stale_step",
            Self::StepResolution(_) => "step_resolution",
            Self::CommitPrecondition(_) => "commit_precondition",
            Self::NotFound(_) => "not_found",
            Self::Catalog(_) => "catalog",
            Self::Store(StoreError::Conflict {
                ..
            }) => "store_conflict",
            Self::Store(StoreError::DuplicateRecord(_)) => "duplicate_record",
            Self::Store(_) => "store",
            Self::Thread(_) => "thread",
            Self::Directory(_) => "directory",
            Self::Attachment(_) => "attachment",
            Self::HelpDesk(_) => "help_desk",
            Self::Hash(_) => "hash",
        }
    }
}

impl From<CleanError> for WizardError {
    fn from(error: CleanError) -> Self {
        match error {
            CleanError::Invalid(errors) => Self::StepResolution(format!("unexpected field errors: {errors}")),
            CleanError::Directory(err) => Self::Directory(err),
            CleanError::Attachment(err) => Self::Attachment(err),
            CleanError::State(message) => Self::StepResolution(message),
        }
    }
}

impl From<CommitError> for WizardError {
    fn from(error: CommitError) -> Self {
        match error {
            CommitError::Precondition(message) => Self::CommitPrecondition(message),
            CommitError::Hash(err) => Self::Hash(err),
        }
    }
}

// ============================================================================
// SECTION: Wizard
// ============================================================================

/// Obligee-action wizard driver.
pub struct Wizard<S, T, O, A, H> {
    /// Ordered step catalog.
    catalog: StepCatalog,
    /// Instance and ledger persistence.
    store: S,
    /// Request thread reader.
    threads: T,
    /// Pending obligee lookup.
    obligees: O,
    /// Staged uploads.
    attachments: A,
    /// Help request receiver.
    help_desk: H,
    /// Driver configuration.
    config: WizardConfig,
    /// Audit sink.
    audit: Arc<dyn WizardAuditSink>,
}

impl<S, T, O, A, H> Wizard<S, T, O, A, H>
where
    S: WizardStore,
    T: ThreadReader,
    O: ObligeeDirectory,
    A: AttachmentStaging,
    H: HelpDesk,
{
    /// Creates a wizard after validating the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::Catalog`] when the catalog is invalid.
    pub fn new(
        catalog: StepCatalog,
        store: S,
        threads: T,
        obligees: O,
        attachments: A,
        help_desk: H,
        config: WizardConfig,
    ) -> Result<Self, WizardError> {
        catalog.validate()?;
        Ok(Self {
            catalog,
            store,
            threads,
            obligees,
            attachments,
            help_desk,
            config,
            audit: Arc::new(NoopAuditSink),
        })
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn WizardAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the step catalog.
    #[must_use]
    pub const fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Opens the flow for a thread, resuming a stored one with the same source.
    ///
    /// A stored flow for a different source is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError`] when the thread cannot be read or saving fails.
    pub fn open(&self, request: OpenRequest) -> Result<WizardInstance, WizardError> {
        self.threads.branches(&request.thread_id)?;
        let kind = WizardKind::ObligeeAction;
        let instance_id = InstanceId::derive(kind, &request.thread_id);
        let expected_version = match self.store.load(&instance_id)? {
            Some(existing) if existing.source == request.source => {
                self.emit(WizardAuditEvent::new("wizard_resumed", &instance_id, None, AuditOutcome::Applied));
                return Ok(existing);
            }
            Some(existing) => existing.version,
            None => 0,
        };
        let mut instance = WizardInstance::new(kind, request.thread_id, request.source, request.draft);
        instance.version = self.store.save(&instance, expected_version)?;
        self.emit(WizardAuditEvent::new("wizard_opened", &instance_id, None, AuditOutcome::Applied));
        Ok(instance)
    }

    /// Resolves the current position of a flow.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::NotFound`] for unknown instances and
    /// [`WizardError::StepResolution`] when the catalog cannot place the state.
    pub fn resolve_current_step(&self, instance_id: &InstanceId) -> Result<StepCursor, WizardError> {
        let instance = self.load(instance_id)?;
        self.cursor(&instance)
    }

    /// Returns true when a result is settled and no step remains.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::NotFound`] for unknown instances.
    pub fn is_terminal(&self, instance_id: &InstanceId) -> Result<bool, WizardError> {
        let instance = self.load(instance_id)?;
        Ok(self.catalog.is_terminal(instance.state(), &instance.completed()))
    }

    /// Describes the current step for rendering.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::StaleStep`] when `step` is not current.
    pub fn step_view(&self, instance_id: &InstanceId, step: StepKey) -> Result<StepView, WizardError> {
        let instance = self.load(instance_id)?;
        let definition = self.current_definition(&instance, step)?;
        let branches = self.threads.branches(&instance.thread_id)?;
        Ok(StepView {
            instance_id: instance.instance_id.clone(),
            step,
            fields: definition.fields(instance.state(), &branches, &self.config.settings),
            state: instance.state().clone(),
            completed: instance.completed(),
        })
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Submits input for the current step.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::StaleStep`] when the step is not current, and
    /// other [`WizardError`] variants when a collaborator or the store fails.
    /// Field errors are an [`SubmitOutcome::Rejected`] value, not an error.
    pub fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, WizardError> {
        let mut instance = self.load(&request.instance_id)?;
        let definition = self.current_definition(&instance, request.step)?;
        let branches = self.threads.branches(&instance.thread_id)?;
        let state = instance.state().clone();
        let ctx = StepContext {
            today: request.today,
            source: &instance.source,
            draft: &instance.draft,
            branches: &branches,
            obligees: &self.obligees,
            attachments: &self.attachments,
            settings: &self.config.settings,
        };
        let cleaned = match definition.clean(&request.input, &state, &ctx) {
            Ok(cleaned) => cleaned,
            Err(CleanError::Invalid(errors)) => {
                let fields = errors.iter().map(|(field, _)| field.to_string()).collect();
                self.emit(
                    WizardAuditEvent::new(
                        "step_rejected",
                        &instance.instance_id,
                        Some(request.step),
                        AuditOutcome::Rejected,
                    )
                    .with_fields(fields),
                );
                return Ok(SubmitOutcome::Rejected(errors));
            }
            Err(err) => return Err(self.failed("step_submitted", &instance, Some(request.step), err.into())),
        };
        let patch = definition.values(&cleaned, &state)?;
        let mut next = state;
        next.merge(patch);
        instance.push(request.step, next);
        instance.version = self.store.save(&instance, instance.version)?;
        let cursor = self.cursor(&instance)?;
        self.emit(WizardAuditEvent::new(
            "step_submitted",
            &instance.instance_id,
            Some(request.step),
            AuditOutcome::Applied,
        ));
        Ok(SubmitOutcome::Advanced(cursor))
    }

    /// Rewinds the flow to just before `step` was answered.
    ///
    /// Going back to the current step is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::StaleStep`] when `step` was neither answered nor
    /// is current.
    pub fn go_back(&self, instance_id: &InstanceId, step: StepKey) -> Result<StepCursor, WizardError> {
        let mut instance = self.load(instance_id)?;
        let Some(position) = instance.position(step) else {
            let current = self.cursor(&instance)?;
            if current == StepCursor::Step(step) {
                return Ok(current);
            }
            return Err(self.stale(&instance, step, current));
        };
        instance.truncate(position);
        instance.version = self.store.save(&instance, instance.version)?;
        let cursor = self.cursor(&instance)?;
        self.emit(WizardAuditEvent::new("went_back", instance_id, Some(step), AuditOutcome::Applied));
        Ok(cursor)
    }

    // ------------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------------

    /// Commits a terminal flow atomically and removes the instance.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::CommitPrecondition`] when the flow is not
    /// terminal or its state is inconsistent; nothing is written in that case.
    pub fn commit(&self, instance_id: &InstanceId) -> Result<CommitOutcome, WizardError> {
        let instance = self.load(instance_id)?;
        let result = match self.cursor(&instance) {
            Ok(StepCursor::Terminal(result)) => Ok(result),
            Ok(StepCursor::Step(step)) => {
                Err(WizardError::CommitPrecondition(format!("flow is not terminal; current step is {step}")))
            }
            Err(err) => Err(err),
        };
        let outcome = result.and_then(|result| match result {
            ResultKind::Action => self.commit_action(&instance),
            ResultKind::Help => self.commit_help(&instance),
            ResultKind::Unrelated => self.commit_unrelated(&instance),
        });
        match outcome {
            Ok(outcome) => {
                self.emit(WizardAuditEvent::new("wizard_committed", instance_id, None, AuditOutcome::Applied));
                Ok(outcome)
            }
            Err(err) => Err(self.failed("commit_failed", &instance, None, err)),
        }
    }

    /// Reads back the committed outputs of a thread.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::Store`] when reading fails.
    pub fn ledger(&self, thread_id: &ThreadId) -> Result<ThreadLedger, WizardError> {
        Ok(self.store.ledger(thread_id)?)
    }

    /// Commits an action result.
    fn commit_action(&self, instance: &WizardInstance) -> Result<CommitOutcome, WizardError> {
        let state = instance.state();
        let captured = state
            .branch()
            .ok_or_else(|| WizardError::CommitPrecondition("no branch captured".to_string()))?;
        let live = self.threads.branch(&instance.thread_id, &captured.branch_id)?.ok_or_else(|| {
            WizardError::CommitPrecondition(format!("branch {} no longer exists", captured.branch_id))
        })?;
        let staged = match &instance.source {
            InputSource::Manual => {
                let ids: Vec<AttachmentId> = state
                    .attachments()
                    .unwrap_or_default()
                    .iter()
                    .map(|attachment| attachment.attachment_id.clone())
                    .collect();
                if ids.is_empty() {
                    Vec::new()
                } else {
                    resolve_staged(&self.attachments, &instance.draft, &ids)?.ok_or_else(|| {
                        WizardError::CommitPrecondition("staged attachment is no longer available".to_string())
                    })?
                }
            }
            InputSource::Message(_) => Vec::new(),
        };
        let batch = commit::action_batch(instance, &live, staged, self.config.hash_algorithm)?;
        self.store.commit(&batch)?;
        let record = batch
            .record
            .ok_or_else(|| WizardError::CommitPrecondition("action batch without a record".to_string()))?;
        Ok(CommitOutcome::Action {
            record,
            backfill: batch.backfill,
        })
    }

    /// Files the help request, then commits the bookkeeping.
    fn commit_help(&self, instance: &WizardInstance) -> Result<CommitOutcome, WizardError> {
        let (batch, request) = commit::help_batch(instance)?;
        self.help_desk.submit_help_request(&request)?;
        self.store.commit(&batch)?;
        Ok(CommitOutcome::Help)
    }

    /// Commits an unrelated result.
    fn commit_unrelated(&self, instance: &WizardInstance) -> Result<CommitOutcome, WizardError> {
        let batch = commit::unrelated_batch(instance)?;
        self.store.commit(&batch)?;
        Ok(CommitOutcome::Unrelated)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Loads an instance or fails with [`WizardError::NotFound`].
    fn load(&self, instance_id: &InstanceId) -> Result<WizardInstance, WizardError> {
        self.store.load(instance_id)?.ok_or_else(|| WizardError::NotFound(instance_id.clone()))
    }

    /// Resolves the position of a loaded instance.
    fn cursor(&self, instance: &WizardInstance) -> Result<StepCursor, WizardError> {
        match self.catalog.resolve(instance.state(), &instance.completed()) {
            Ok(resolution) => Ok(resolution.into()),
            Err(err) => Err(WizardError::StepResolution(err.to_string())),
        }
    }

    /// Returns the definition of `step` if it is the current step.
    fn current_definition(&self, instance: &WizardInstance, step: StepKey) -> Result<&StepDefinition, WizardError> {
        let current = self.cursor(instance)?;
        if current != StepCursor::Step(step) {
            return Err(self.stale(instance, step, current));
        }
        self.catalog
            .get(step)
            .ok_or_else(|| WizardError::StepResolution(format!("step {step} missing from catalog")))
    }

    /// Records and builds a stale step error.
    fn stale(&self, instance: &WizardInstance, requested: StepKey, current: StepCursor) -> WizardError {
        let error = WizardError::StaleStep {
            requested,
            current,
        };
        self.failed("stale_step", instance, Some(requested), error)
    }

    /// Records a failed transition and passes the error through.
    fn failed(
        &self,
        event: &'static str,
        instance: &WizardInstance,
        step: Option<StepKey>,
        error: WizardError,
    ) -> WizardError {
        self.emit(
            WizardAuditEvent::new(event, &instance.instance_id, step, AuditOutcome::Failed)
                .with_error_kind(error.kind()),
        );
        error
    }

    /// Sends an event to the audit sink.
    fn emit(&self, event: WizardAuditEvent) {
        self.audit.record(&event);
    }
}
