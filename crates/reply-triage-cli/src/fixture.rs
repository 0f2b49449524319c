// crates/reply-triage-cli/src/fixture.rs
// ============================================================================
// Module: Thread Fixtures
// Description: JSON-backed request threads, obligee directory, and staging area.
// Purpose: Supply the wizard's read-side collaborators from a single file.
// Dependencies: reply-triage-core, serde
// ============================================================================

//! ## Overview
//! A thread fixture describes everything the wizard reads but does not own:
//!
//! ```json
//! {
//!   "threads": { "t-1": [ { "branch_id": "b-1", "obligee": { ... },
//!                           "addable": ["disclosure"], "last_action": { ... } } ] },
//!   "obligees": [ { "obligee_id": "o-2", "name": "City Hall" } ],
//!   "staged": [ { "draft": { "session_id": "s", "draft_id": "d" },
//!                 "attachment": { ... } } ]
//! }
//! ```
//!
//! Obligees listed in the fixture are treated as pending; dissolved obligees
//! are simply left out.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use reply_triage_core::AttachmentError;
use reply_triage_core::AttachmentRef;
use reply_triage_core::AttachmentStaging;
use reply_triage_core::BranchSnapshot;
use reply_triage_core::DirectoryError;
use reply_triage_core::DraftRef;
use reply_triage_core::ObligeeDirectory;
use reply_triage_core::ObligeeRef;
use reply_triage_core::ThreadError;
use reply_triage_core::ThreadId;
use reply_triage_core::ThreadReader;
use serde::Deserialize;
use serde::Serialize;

use crate::input::MAX_FIXTURE_BYTES;
use crate::input::ReadLimitError;
use crate::input::read_json_with_limit;

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// One upload staged against a draft holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagedUpload {
    /// Draft holder the upload belongs to.
    pub draft: DraftRef,
    /// Uploaded attachment.
    pub attachment: AttachmentRef,
}

/// Thread fixture file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadFixture {
    /// Branches keyed by thread id.
    #[serde(default)]
    pub threads: BTreeMap<String, Vec<BranchSnapshot>>,
    /// Pending obligees.
    #[serde(default)]
    pub obligees: Vec<ObligeeRef>,
    /// Staged uploads.
    #[serde(default)]
    pub staged: Vec<StagedUpload>,
}

impl ThreadFixture {
    /// Loads a fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`ReadLimitError`] when the file is unreadable, too large, or
    /// not a valid fixture.
    pub fn load(path: &Path) -> Result<Self, ReadLimitError> {
        read_json_with_limit(path, MAX_FIXTURE_BYTES)
    }

    /// Splits the fixture into the three collaborators the wizard takes.
    #[must_use]
    pub fn into_parts(self) -> (FixtureThreads, FixtureDirectory, FixtureStaging) {
        (
            FixtureThreads {
                threads: self.threads,
            },
            FixtureDirectory {
                obligees: self.obligees,
            },
            FixtureStaging {
                staged: self.staged,
            },
        )
    }
}

// ============================================================================
// SECTION: Collaborators
// ============================================================================

/// Request threads read from a fixture.
#[derive(Debug, Clone, Default)]
pub struct FixtureThreads {
    /// Branches keyed by thread id.
    threads: BTreeMap<String, Vec<BranchSnapshot>>,
}

impl ThreadReader for FixtureThreads {
    fn branches(&self, thread_id: &ThreadId) -> Result<Vec<BranchSnapshot>, ThreadError> {
        self.threads.get(thread_id.as_str()).cloned().ok_or_else(|| ThreadError::NotFound(thread_id.to_string()))
    }
}

/// Pending obligees read from a fixture.
#[derive(Debug, Clone, Default)]
pub struct FixtureDirectory {
    /// Pending obligees.
    obligees: Vec<ObligeeRef>,
}

impl ObligeeDirectory for FixtureDirectory {
    fn find_pending_by_name(&self, name: &str) -> Result<Option<ObligeeRef>, DirectoryError> {
        Ok(self.obligees.iter().find(|obligee| obligee.name == name).cloned())
    }
}

/// Staged uploads read from a fixture.
#[derive(Debug, Clone, Default)]
pub struct FixtureStaging {
    /// Staged uploads.
    staged: Vec<StagedUpload>,
}

impl AttachmentStaging for FixtureStaging {
    fn staged(&self, draft: &DraftRef) -> Result<Vec<AttachmentRef>, AttachmentError> {
        Ok(self
            .staged
            .iter()
            .filter(|upload| &upload.draft == draft)
            .map(|upload| upload.attachment.clone())
            .collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use reply_triage_core::ActionType;
    use reply_triage_core::DraftId;
    use reply_triage_core::SessionId;

    use super::*;

    const FIXTURE: &str = r#"{
        "threads": {
            "t-1": [{
                "branch_id": "b-1",
                "obligee": {"obligee_id": "o-1", "name": "Ministry of Finance"},
                "addable": ["disclosure", "refusal"],
                "last_action": {"action_type": "request", "legal_date": "2024-02-01", "delivered_date": null}
            }]
        },
        "obligees": [{"obligee_id": "o-2", "name": "City Hall"}],
        "staged": [{
            "draft": {"session_id": "s-1", "draft_id": "d-1"},
            "attachment": {"attachment_id": "a-1", "name": "scan.pdf", "content_type": "application/pdf", "size": 10}
        }]
    }"#;

    #[test]
    fn fixture_parts_answer_lookups() {
        let fixture: ThreadFixture = serde_json::from_str(FIXTURE).unwrap();
        let (threads, directory, staging) = fixture.into_parts();

        let branches = threads.branches(&ThreadId::new("t-1")).unwrap();
        assert!(branches[0].can_add(ActionType::Disclosure));
        assert!(matches!(threads.branches(&ThreadId::new("t-9")), Err(ThreadError::NotFound(_))));

        assert!(directory.find_pending_by_name("City Hall").unwrap().is_some());
        assert!(directory.find_pending_by_name("city hall").unwrap().is_none());

        let draft = DraftRef {
            session_id: SessionId::new("s-1"),
            draft_id: DraftId::new("d-1"),
        };
        assert_eq!(staging.staged(&draft).unwrap().len(), 1);
        let other = DraftRef {
            session_id: SessionId::new("s-2"),
            draft_id: DraftId::new("d-1"),
        };
        assert!(staging.staged(&other).unwrap().is_empty());
    }

    #[test]
    fn fixture_rejects_unknown_sections() {
        assert!(serde_json::from_str::<ThreadFixture>(r#"{"messages": []}"#).is_err());
    }
}
