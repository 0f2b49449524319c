// crates/reply-triage-core/src/runtime/audit.rs
// ============================================================================
// Module: Wizard Audit Logging
// Description: Structured audit events for wizard transitions and commits.
// Purpose: Emit redacted JSON-line audit logs without a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every wizard transition emits one [`WizardAuditEvent`]. Events carry
//! identifiers, step keys, outcomes, and error kinds only; submitted field
//! values and help texts are never logged. Sinks are best effort: a sink that
//! cannot write drops the event rather than failing the request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::InstanceId;
use crate::core::StepKey;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome label of an audited transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The transition was applied.
    Applied,
    /// The input was rejected with field errors.
    Rejected,
    /// The transition failed.
    Failed,
}

/// Wizard audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Instance identifier.
    pub instance_id: String,
    /// Step key when the event concerns one step.
    pub step: Option<StepKey>,
    /// Transition outcome.
    pub outcome: AuditOutcome,
    /// Names of rejected fields, without values.
    pub fields: Vec<String>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
}

impl WizardAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(event: &'static str, instance_id: &InstanceId, step: Option<StepKey>, outcome: AuditOutcome) -> Self {
        let timestamp_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            instance_id: instance_id.as_str().to_string(),
            step,
            outcome,
            fields: Vec::new(),
            error_kind: None,
        }
    }

    /// Attaches rejected field names.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// Attaches an error kind label.
    #[must_use]
    pub const fn with_error_kind(mut self, kind: &'static str) -> Self {
        self.error_kind = Some(kind);
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for wizard events.
pub trait WizardAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &WizardAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl WizardAuditSink for StderrAuditSink {
    fn record(&self, event: &WizardAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl WizardAuditSink for FileAuditSink {
    fn record(&self, event: &WizardAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl WizardAuditSink for NoopAuditSink {
    fn record(&self, _event: &WizardAuditEvent) {}
}

/// Audit sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events.
    events: Mutex<Vec<WizardAuditEvent>>,
}

impl MemoryAuditSink {
    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<WizardAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl WizardAuditSink for MemoryAuditSink {
    fn record(&self, event: &WizardAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
