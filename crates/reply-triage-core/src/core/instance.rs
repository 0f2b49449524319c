// crates/reply-triage-core/src/core/instance.rs
// ============================================================================
// Module: Wizard Instances
// Description: Step keys, completed-step history, and persisted instance state.
// Purpose: Capture one classification flow so it can be resumed and rewound.
// Dependencies: serde, crate::core::{identifiers, model, state}
// ============================================================================

//! ## Overview
//! A [`WizardInstance`] is the unit of persistence and mutual exclusion. It
//! stores the seeded initial state plus one [`CompletedStep`] per answered
//! step, each carrying a full snapshot of the accumulated state *after* that
//! step. Going back truncates the history; the current state is always the
//! last snapshot, so no merge ever has to be undone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DraftId;
use crate::core::identifiers::InstanceId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::ThreadId;
use crate::core::identifiers::WizardKind;
use crate::core::model::InputSource;
use crate::core::state::AccumulatedState;

// ============================================================================
// SECTION: Step Keys
// ============================================================================

/// Keys of the obligee-action steps, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    /// Branch, delivery date, and attachments.
    Basics,
    /// Is the reply a clarification request?
    IsQuestion,
    /// Is the reply a receipt confirmation?
    IsConfirmation,
    /// Is the reply about the request at all?
    IsOnTopic,
    /// How much information does the reply contain?
    ContainsInfo,
    /// Is the reply a formal decision?
    IsDecision,
    /// Reasons for a refusal.
    RefusalReasons,
    /// Was the request forwarded to other obligees?
    IsAdvancement,
    /// Was the deadline extended?
    IsExtension,
    /// Reasons for withholding part of a disclosure.
    DisclosureReasons,
    /// Is the reply a decision on an appeal?
    IsAppealDecision,
    /// How much information does the appeal decision contain?
    ContainsAppealInfo,
    /// How much of the appeal was accepted?
    WasAccepted,
    /// Was the case returned to the obligee?
    WasReturned,
    /// Reasons for a partial reversion.
    ReversionReasons,
    /// Help request for an appeal decision that cannot be classified.
    InvalidReversion,
    /// Catch-all: help request or unrelated.
    NotCategorized,
    /// Legal date, file number, and delivered-date backfill.
    Categorized,
}

impl StepKey {
    /// All step keys in catalog order.
    pub const ALL: [Self; 18] = [
        Self::Basics,
        Self::IsQuestion,
        Self::IsConfirmation,
        Self::IsOnTopic,
        Self::ContainsInfo,
        Self::IsDecision,
        Self::RefusalReasons,
        Self::IsAdvancement,
        Self::IsExtension,
        Self::DisclosureReasons,
        Self::IsAppealDecision,
        Self::ContainsAppealInfo,
        Self::WasAccepted,
        Self::WasReturned,
        Self::ReversionReasons,
        Self::InvalidReversion,
        Self::NotCategorized,
        Self::Categorized,
    ];

    /// Returns the stable key string used in addresses and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basics => "basics",
            Self::IsQuestion => "is_question",
            Self::IsConfirmation => "is_confirmation",
            Self::IsOnTopic => "is_on_topic",
            Self::ContainsInfo => "contains_info",
            Self::IsDecision => "is_decision",
            Self::RefusalReasons => "refusal_reasons",
            Self::IsAdvancement => "is_advancement",
            Self::IsExtension => "is_extension",
            Self::DisclosureReasons => "disclosure_reasons",
            Self::IsAppealDecision => "is_appeal_decision",
            Self::ContainsAppealInfo => "contains_appeal_info",
            Self::WasAccepted => "was_accepted",
            Self::WasReturned => "was_returned",
            Self::ReversionReasons => "reversion_reasons",
            Self::InvalidReversion => "invalid_reversion",
            Self::NotCategorized => "not_categorized",
            Self::Categorized => "categorized",
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown step key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step key: {0}")]
pub struct UnknownStepKey(pub String);

impl FromStr for StepKey {
    type Err = UnknownStepKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == value)
            .ok_or_else(|| UnknownStepKey(value.to_string()))
    }
}

// ============================================================================
// SECTION: Draft Holder
// ============================================================================

/// Draft holder that staged attachments are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftRef {
    /// Browser or API session.
    pub session_id: SessionId,
    /// Draft the uploads are attached to.
    pub draft_id: DraftId,
}

// ============================================================================
// SECTION: Instance
// ============================================================================

/// One answered step and the state right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    /// Answered step.
    pub step: StepKey,
    /// Accumulated state after merging the step's values.
    pub state_after: AccumulatedState,
}

/// Persisted classification flow for one (wizard kind, thread).
///
/// # Invariants
/// - `instance_id` equals `InstanceId::derive(kind, &thread_id)`.
/// - No step key appears twice in `history`.
/// - `version` is the stored version the instance was loaded at; zero means
///   never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardInstance {
    /// Stable instance identifier.
    pub instance_id: InstanceId,
    /// Wizard kind.
    pub kind: WizardKind,
    /// Thread the reply belongs to.
    pub thread_id: ThreadId,
    /// Input source of the reply.
    pub source: InputSource,
    /// Draft holder for staged attachments.
    pub draft: DraftRef,
    /// State before any step was answered.
    pub initial_state: AccumulatedState,
    /// Answered steps in order.
    pub history: Vec<CompletedStep>,
    /// Stored version.
    pub version: u64,
}

impl WizardInstance {
    /// Creates a fresh, unsaved instance.
    #[must_use]
    pub fn new(kind: WizardKind, thread_id: ThreadId, source: InputSource, draft: DraftRef) -> Self {
        let initial_state = AccumulatedState::seeded(source.kind());
        Self {
            instance_id: InstanceId::derive(kind, &thread_id),
            kind,
            thread_id,
            source,
            draft,
            initial_state,
            history: Vec::new(),
            version: 0,
        }
    }

    /// Returns the current accumulated state.
    #[must_use]
    pub fn state(&self) -> &AccumulatedState {
        self.history.last().map_or(&self.initial_state, |step| &step.state_after)
    }

    /// Returns the answered step keys in order.
    #[must_use]
    pub fn completed(&self) -> Vec<StepKey> {
        self.history.iter().map(|step| step.step).collect()
    }

    /// Returns the history position of a step, if it was answered.
    #[must_use]
    pub fn position(&self, step: StepKey) -> Option<usize> {
        self.history.iter().position(|entry| entry.step == step)
    }

    /// Records an answered step.
    pub fn push(&mut self, step: StepKey, state_after: AccumulatedState) {
        self.history.push(CompletedStep {
            step,
            state_after,
        });
    }

    /// Drops the step at `position` and everything answered after it.
    pub fn truncate(&mut self, position: usize) {
        self.history.truncate(position);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::SourceKind;
    use crate::core::state::StateKey;
    use crate::core::state::StatePatch;
    use crate::core::state::StateValue;

    /// Builds a manual-source instance for thread `t-1`.
    fn instance() -> WizardInstance {
        WizardInstance::new(
            WizardKind::ObligeeAction,
            ThreadId::new("t-1"),
            InputSource::Manual,
            DraftRef {
                session_id: SessionId::new("s"),
                draft_id: DraftId::new("d"),
            },
        )
    }

    #[test]
    fn step_keys_round_trip_through_strings() {
        for key in StepKey::ALL {
            assert_eq!(key.as_str().parse::<StepKey>(), Ok(key));
        }
        assert!("nope".parse::<StepKey>().is_err());
    }

    #[test]
    fn fresh_instance_is_seeded_with_its_source() {
        let instance = instance();
        assert_eq!(instance.instance_id.as_str(), "obligee-action-t-1");
        assert_eq!(instance.state().source(), Some(SourceKind::Manual));
        assert_eq!(instance.version, 0);
    }

    #[test]
    fn truncate_restores_the_prior_snapshot() {
        let mut instance = instance();
        let mut after_first = instance.state().clone();
        after_first.merge(StatePatch::new().with(StateKey::IsOnTopic, StateValue::Bool(true)));
        instance.push(StepKey::Basics, after_first.clone());
        let mut after_second = after_first.clone();
        after_second.merge(StatePatch::new().with(StateKey::IsDecision, StateValue::Bool(true)));
        instance.push(StepKey::IsOnTopic, after_second);

        let position = instance.position(StepKey::IsOnTopic);
        assert_eq!(position, Some(1));
        instance.truncate(1);
        assert_eq!(instance.state(), &after_first);
        assert_eq!(instance.completed(), vec![StepKey::Basics]);
    }
}
