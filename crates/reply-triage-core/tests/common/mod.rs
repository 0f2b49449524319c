// crates/reply-triage-core/tests/common/mod.rs
// =============================================================================
// Module: Wizard Test Helpers
// Description: In-memory collaborators and a wizard harness for integration tests.
// Purpose: Reduce duplication across integration tests for reply-triage-core.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only helpers panic on broken fixtures."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use reply_triage_core::ActionType;
use reply_triage_core::AttachmentError;
use reply_triage_core::AttachmentId;
use reply_triage_core::AttachmentRef;
use reply_triage_core::AttachmentStaging;
use reply_triage_core::BranchId;
use reply_triage_core::BranchSnapshot;
use reply_triage_core::DirectoryError;
use reply_triage_core::DraftId;
use reply_triage_core::DraftRef;
use reply_triage_core::HelpDesk;
use reply_triage_core::HelpDeskError;
use reply_triage_core::HelpRequest;
use reply_triage_core::InMemoryWizardStore;
use reply_triage_core::InputSource;
use reply_triage_core::InstanceId;
use reply_triage_core::LastAction;
use reply_triage_core::MemoryAuditSink;
use reply_triage_core::MessageId;
use reply_triage_core::MessageSnapshot;
use reply_triage_core::ObligeeDirectory;
use reply_triage_core::ObligeeId;
use reply_triage_core::ObligeeRef;
use reply_triage_core::OpenRequest;
use reply_triage_core::RawInput;
use reply_triage_core::SessionId;
use reply_triage_core::StepCatalog;
use reply_triage_core::StepCursor;
use reply_triage_core::StepKey;
use reply_triage_core::SubmitOutcome;
use reply_triage_core::SubmitRequest;
use reply_triage_core::ThreadError;
use reply_triage_core::ThreadId;
use reply_triage_core::ThreadReader;
use reply_triage_core::ValidationErrors;
use reply_triage_core::Wizard;
use reply_triage_core::WizardConfig;
use reply_triage_core::WizardError;
use serde_json::Value;
use time::Date;
use time::macros::date;

// ============================================================================
// SECTION: Fixture Data
// ============================================================================

/// Thread used by every harness.
pub const THREAD: &str = "t-1";
/// Branch used by every harness.
pub const BRANCH: &str = "b-1";

/// Local day all submissions are made on.
pub fn today() -> Date {
    date!(2024 - 03 - 05)
}

/// Obligee the branch is addressed to.
pub fn own_obligee() -> ObligeeRef {
    obligee("o-own", "Ministry of Finance")
}

/// Builds an obligee reference.
pub fn obligee(id: &str, name: &str) -> ObligeeRef {
    ObligeeRef {
        obligee_id: ObligeeId::new(id),
        name: name.to_string(),
    }
}

/// Branch accepting the given actions, last action a request without delivery date.
pub fn branch(addable: &[ActionType]) -> BranchSnapshot {
    BranchSnapshot {
        branch_id: BranchId::new(BRANCH),
        obligee: own_obligee(),
        addable: addable.iter().copied().collect::<BTreeSet<_>>(),
        last_action: LastAction {
            action_type: ActionType::Request,
            legal_date: date!(2024 - 02 - 01),
            delivered_date: None,
        },
    }
}

/// Incoming message processed on 2024-03-01.
pub fn message() -> InputSource {
    InputSource::Message(MessageSnapshot {
        message_id: MessageId::new("m-1"),
        subject: "Re: information request".to_string(),
        text: "Please find the requested documents attached.".to_string(),
        processed_date: date!(2024 - 03 - 01),
        attachments: vec![attachment("mail-1")],
    })
}

/// Builds an attachment reference.
pub fn attachment(id: &str) -> AttachmentRef {
    AttachmentRef {
        attachment_id: AttachmentId::new(id),
        name: format!("{id}.pdf"),
        content_type: "application/pdf".to_string(),
        size: 1024,
    }
}

/// Converts a JSON object literal into raw input.
pub fn input(value: Value) -> RawInput {
    value.as_object().cloned().expect("input must be a JSON object")
}

// ============================================================================
// SECTION: Collaborators
// ============================================================================

/// Thread reader over mutable fixture branches.
#[derive(Debug, Default, Clone)]
pub struct FixtureThreads {
    /// Branches keyed by thread id.
    threads: Arc<Mutex<BTreeMap<String, Vec<BranchSnapshot>>>>,
}

impl FixtureThreads {
    /// Replaces the branches of a thread.
    pub fn set(&self, thread: &str, branches: Vec<BranchSnapshot>) {
        self.threads.lock().unwrap().insert(thread.to_string(), branches);
    }
}

impl ThreadReader for FixtureThreads {
    fn branches(&self, thread_id: &ThreadId) -> Result<Vec<BranchSnapshot>, ThreadError> {
        self.threads
            .lock()
            .unwrap()
            .get(thread_id.as_str())
            .cloned()
            .ok_or_else(|| ThreadError::NotFound(thread_id.to_string()))
    }
}

/// Obligee directory over a fixed list of pending obligees.
#[derive(Debug, Default, Clone)]
pub struct FixtureDirectory {
    /// Pending obligees.
    obligees: Vec<ObligeeRef>,
}

impl FixtureDirectory {
    /// Directory containing the own obligee and three others.
    pub fn standard() -> Self {
        Self {
            obligees: vec![
                own_obligee(),
                obligee("o-a", "Regional Office"),
                obligee("o-b", "City Hall"),
                obligee("o-c", "Tax Authority"),
            ],
        }
    }
}

impl ObligeeDirectory for FixtureDirectory {
    fn find_pending_by_name(&self, name: &str) -> Result<Option<ObligeeRef>, DirectoryError> {
        Ok(self.obligees.iter().find(|obligee| obligee.name == name).cloned())
    }
}

/// Staging area keyed by draft holder.
#[derive(Debug, Default, Clone)]
pub struct FixtureStaging {
    /// Staged uploads.
    staged: Arc<Mutex<Vec<AttachmentRef>>>,
}

impl FixtureStaging {
    /// Stages an upload.
    pub fn stage(&self, attachment: AttachmentRef) {
        self.staged.lock().unwrap().push(attachment);
    }

    /// Removes every staged upload.
    pub fn clear(&self) {
        self.staged.lock().unwrap().clear();
    }
}

impl AttachmentStaging for FixtureStaging {
    fn staged(&self, draft: &DraftRef) -> Result<Vec<AttachmentRef>, AttachmentError> {
        if draft != &draft_ref() {
            return Ok(Vec::new());
        }
        Ok(self.staged.lock().unwrap().clone())
    }
}

/// Help desk that records requests and can be switched to fail.
#[derive(Debug, Default, Clone)]
pub struct RecordingHelpDesk {
    /// Filed requests.
    requests: Arc<Mutex<Vec<HelpRequest>>>,
    /// Whether filing fails.
    failing: Arc<Mutex<bool>>,
}

impl RecordingHelpDesk {
    /// Makes subsequent requests fail.
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    /// Makes subsequent requests succeed again.
    pub fn recover(&self) {
        *self.failing.lock().unwrap() = false;
    }

    /// Returns the filed requests as `(thread, text)` pairs.
    pub fn requests(&self) -> Vec<(ThreadId, String)> {
        self.requests.lock().unwrap().iter().map(|request| (request.thread_id.clone(), request.text.clone())).collect()
    }

    /// Returns the request keys in filing order.
    pub fn request_keys(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|request| request.request_key.clone()).collect()
    }
}

impl HelpDesk for RecordingHelpDesk {
    fn submit_help_request(&self, request: &HelpRequest) -> Result<(), HelpDeskError> {
        if *self.failing.lock().unwrap() {
            return Err(HelpDeskError::Source("ticketing offline".to_string()));
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Draft holder used by every harness.
pub fn draft_ref() -> DraftRef {
    DraftRef {
        session_id: SessionId::new("session-1"),
        draft_id: DraftId::new("draft-1"),
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Wizard wired to fixture collaborators.
pub type TestWizard =
    Wizard<InMemoryWizardStore, FixtureThreads, FixtureDirectory, FixtureStaging, RecordingHelpDesk>;

/// Wizard plus handles to its collaborators.
pub struct Harness {
    /// Driver under test.
    pub wizard: TestWizard,
    /// Shared store handle.
    pub store: InMemoryWizardStore,
    /// Shared thread handle.
    pub threads: FixtureThreads,
    /// Shared staging handle.
    pub staging: FixtureStaging,
    /// Shared help desk handle.
    pub help_desk: RecordingHelpDesk,
    /// Recorded audit events.
    pub audit: Arc<MemoryAuditSink>,
}

impl Harness {
    /// Harness whose single branch accepts `addable`.
    pub fn new(addable: &[ActionType]) -> Self {
        let store = InMemoryWizardStore::new();
        let threads = FixtureThreads::default();
        threads.set(THREAD, vec![branch(addable)]);
        let staging = FixtureStaging::default();
        let help_desk = RecordingHelpDesk::default();
        let audit = Arc::new(MemoryAuditSink::default());
        let wizard = Wizard::new(
            StepCatalog::obligee_action(),
            store.clone(),
            threads.clone(),
            FixtureDirectory::standard(),
            staging.clone(),
            help_desk.clone(),
            WizardConfig::default(),
        )
        .unwrap()
        .with_audit_sink(audit.clone());
        Self {
            wizard,
            store,
            threads,
            staging,
            help_desk,
            audit,
        }
    }

    /// Opens the flow for the fixture thread.
    pub fn open(&self, source: InputSource) -> InstanceId {
        self.wizard
            .open(OpenRequest {
                thread_id: ThreadId::new(THREAD),
                source,
                draft: draft_ref(),
            })
            .unwrap()
            .instance_id
    }

    /// Submits input for a step.
    pub fn submit(&self, id: &InstanceId, step: StepKey, value: Value) -> Result<SubmitOutcome, WizardError> {
        self.wizard.submit(SubmitRequest {
            instance_id: id.clone(),
            step,
            input: input(value),
            today: today(),
        })
    }

    /// Submits input that must be accepted, returning the new position.
    pub fn advance(&self, id: &InstanceId, step: StepKey, value: Value) -> StepCursor {
        match self.submit(id, step, value).unwrap() {
            SubmitOutcome::Advanced(cursor) => cursor,
            SubmitOutcome::Rejected(errors) => panic!("step {step} rejected: {errors}"),
        }
    }

    /// Submits input that must be rejected, returning the field errors.
    pub fn reject(&self, id: &InstanceId, step: StepKey, value: Value) -> ValidationErrors {
        match self.submit(id, step, value).unwrap() {
            SubmitOutcome::Rejected(errors) => errors,
            SubmitOutcome::Advanced(cursor) => panic!("step {step} unexpectedly advanced to {cursor}"),
        }
    }

    /// Returns the thread id of the fixture.
    pub fn thread(&self) -> ThreadId {
        ThreadId::new(THREAD)
    }
}
