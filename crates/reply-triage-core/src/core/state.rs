// crates/reply-triage-core/src/core/state.rs
// ============================================================================
// Module: Accumulated State
// Description: Typed key/value record built up across answered steps.
// Purpose: Hold every answer and signal that later steps and commit read.
// Dependencies: serde, time, crate::core::model
// ============================================================================

//! ## Overview
//! [`AccumulatedState`] maps [`StateKey`] to [`StateValue`]. Merging is
//! overwrite-only: a patch may replace a value but never removes a key. The
//! state is terminal once [`StateKey::Result`] is present; whether the wizard
//! still has a step to run (Categorized, `ReversionReasons`, `InvalidReversion`)
//! is decided by the catalog, not by the state alone.
//!
//! Security posture: values are untrusted user input already coerced by the
//! form layer; accessors return `None` on type mismatches rather than panic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use time::Date;

use crate::core::model::Acceptance;
use crate::core::model::ActionType;
use crate::core::model::AttachmentRef;
use crate::core::model::BranchSnapshot;
use crate::core::model::DisclosureLevel;
use crate::core::model::ObligeeRef;
use crate::core::model::RefusalReason;
use crate::core::model::ResultKind;
use crate::core::model::SourceKind;

// ============================================================================
// SECTION: Keys and Values
// ============================================================================

/// Keys of the accumulated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKey {
    /// Input source kind, seeded on open.
    Source,
    /// Branch snapshot captured by Basics.
    Branch,
    /// Delivery date of the reply.
    DeliveredDate,
    /// Staged attachments (manual source only).
    Attachments,
    /// Answer to `IsQuestion`.
    IsQuestion,
    /// Answer to `IsConfirmation`.
    IsConfirmation,
    /// Answer to `IsOnTopic`; absent means on topic.
    IsOnTopic,
    /// Disclosure level from `ContainsInfo` or `ContainsAppealInfo`.
    DisclosureLevel,
    /// Answer to `IsDecision`.
    IsDecision,
    /// Refusal reasons; empty when "none" was chosen.
    RefusalReasons,
    /// Answer to `IsAdvancement`.
    IsAdvancement,
    /// Advancement targets.
    AdvancedTo,
    /// Answer to `IsExtension`.
    IsExtension,
    /// Extension length in days.
    Extension,
    /// Answer to `IsAppealDecision`; absent means an appeal decision.
    IsAppealDecision,
    /// Answer to `WasAccepted`.
    WasAccepted,
    /// Answer to `WasReturned`.
    WasReturned,
    /// Terminal result category.
    Result,
    /// Pending action type.
    Action,
    /// Free-text help request.
    HelpRequest,
    /// Legal date from Categorized.
    LegalDate,
    /// Obligee file number from Categorized.
    FileNumber,
    /// Backfilled delivered date of the branch's last action.
    LastActionDeliveredDate,
}

impl StateKey {
    /// Returns the stable label of the key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Branch => "branch",
            Self::DeliveredDate => "delivered_date",
            Self::Attachments => "attachments",
            Self::IsQuestion => "is_question",
            Self::IsConfirmation => "is_confirmation",
            Self::IsOnTopic => "is_on_topic",
            Self::DisclosureLevel => "disclosure_level",
            Self::IsDecision => "is_decision",
            Self::RefusalReasons => "refusal_reasons",
            Self::IsAdvancement => "is_advancement",
            Self::AdvancedTo => "advanced_to",
            Self::IsExtension => "is_extension",
            Self::Extension => "extension",
            Self::IsAppealDecision => "is_appeal_decision",
            Self::WasAccepted => "was_accepted",
            Self::WasReturned => "was_returned",
            Self::Result => "result",
            Self::Action => "action",
            Self::HelpRequest => "help_request",
            Self::LegalDate => "legal_date",
            Self::FileNumber => "file_number",
            Self::LastActionDeliveredDate => "last_action_delivered_date",
        }
    }
}

/// Typed state values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateValue {
    /// Yes/no answer or signal.
    Bool(bool),
    /// Free text.
    Text(String),
    /// Calendar date.
    Date(Date),
    /// Extension length in days.
    Extension(u8),
    /// Input source kind.
    Source(SourceKind),
    /// Captured branch.
    Branch(BranchSnapshot),
    /// Attachment list.
    Attachments(Vec<AttachmentRef>),
    /// Result category.
    Result(ResultKind),
    /// Action type.
    Action(ActionType),
    /// Disclosure level.
    Disclosure(DisclosureLevel),
    /// Appeal acceptance.
    Acceptance(Acceptance),
    /// Refusal reasons.
    Reasons(Vec<RefusalReason>),
    /// Obligee references.
    Obligees(Vec<ObligeeRef>),
}

// ============================================================================
// SECTION: Patches
// ============================================================================

/// Incremental key/value pairs produced by a step projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    /// Entries in the order the step set them.
    entries: Vec<(StateKey, StateValue)>,
}

impl StatePatch {
    /// Creates an empty patch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds an entry, returning the patch for chaining.
    #[must_use]
    pub fn with(mut self, key: StateKey, value: StateValue) -> Self {
        self.entries.push((key, value));
        self
    }

    /// Adds an entry in place.
    pub fn set(&mut self, key: StateKey, value: StateValue) {
        self.entries.push((key, value));
    }

    /// Sets the result and, for actions, the pending action type.
    pub fn set_action(&mut self, action: ActionType) {
        self.set(StateKey::Result, StateValue::Result(ResultKind::Action));
        self.set(StateKey::Action, StateValue::Action(action));
    }

    /// Returns true when the patch sets nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the keys the patch sets.
    pub fn keys(&self) -> impl Iterator<Item = StateKey> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }
}

// ============================================================================
// SECTION: Accumulated State
// ============================================================================

/// Growing key/value record owned by one wizard instance.
///
/// # Invariants
/// - Keys are never removed by [`AccumulatedState::merge`].
/// - Once [`StateKey::Result`] is set, result-absence predicates stay false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccumulatedState {
    /// Entries keyed by state key.
    entries: BTreeMap<StateKey, StateValue>,
}

impl AccumulatedState {
    /// Creates an empty state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Creates the initial state for an input source.
    #[must_use]
    pub fn seeded(source: SourceKind) -> Self {
        let mut state = Self::new();
        state.entries.insert(StateKey::Source, StateValue::Source(source));
        state
    }

    /// Merges a patch, overwriting existing keys.
    pub fn merge(&mut self, patch: StatePatch) {
        for (key, value) in patch.entries {
            self.entries.insert(key, value);
        }
    }

    /// Returns the raw value for a key.
    #[must_use]
    pub fn get(&self, key: StateKey) -> Option<&StateValue> {
        self.entries.get(&key)
    }

    /// Returns true when the key is present.
    #[must_use]
    pub fn contains(&self, key: StateKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the state holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &StateValue)> {
        self.entries.iter()
    }

    /// Returns a boolean answer.
    #[must_use]
    pub fn flag(&self, key: StateKey) -> Option<bool> {
        match self.get(key) {
            Some(StateValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns a boolean answer, or `default` when it was never recorded.
    #[must_use]
    pub fn flag_or(&self, key: StateKey, default: bool) -> bool {
        self.flag(key).unwrap_or(default)
    }

    /// Returns a date value.
    #[must_use]
    pub fn date(&self, key: StateKey) -> Option<Date> {
        match self.get(key) {
            Some(StateValue::Date(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns a text value.
    #[must_use]
    pub fn text(&self, key: StateKey) -> Option<&str> {
        match self.get(key) {
            Some(StateValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns the input source kind.
    #[must_use]
    pub fn source(&self) -> Option<SourceKind> {
        match self.get(StateKey::Source) {
            Some(StateValue::Source(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns the captured branch.
    #[must_use]
    pub fn branch(&self) -> Option<&BranchSnapshot> {
        match self.get(StateKey::Branch) {
            Some(StateValue::Branch(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns the terminal result, if any.
    #[must_use]
    pub fn result(&self) -> Option<ResultKind> {
        match self.get(StateKey::Result) {
            Some(StateValue::Result(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns the pending action type.
    #[must_use]
    pub fn action(&self) -> Option<ActionType> {
        match self.get(StateKey::Action) {
            Some(StateValue::Action(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns the recorded disclosure level.
    #[must_use]
    pub fn disclosure_level(&self) -> Option<DisclosureLevel> {
        match self.get(StateKey::DisclosureLevel) {
            Some(StateValue::Disclosure(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns the extension length.
    #[must_use]
    pub fn extension(&self) -> Option<u8> {
        match self.get(StateKey::Extension) {
            Some(StateValue::Extension(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns the refusal reasons.
    #[must_use]
    pub fn refusal_reasons(&self) -> Option<&[RefusalReason]> {
        match self.get(StateKey::RefusalReasons) {
            Some(StateValue::Reasons(value)) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// Returns the advancement targets.
    #[must_use]
    pub fn advanced_to(&self) -> Option<&[ObligeeRef]> {
        match self.get(StateKey::AdvancedTo) {
            Some(StateValue::Obligees(value)) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// Returns the staged attachments.
    #[must_use]
    pub fn attachments(&self) -> Option<&[AttachmentRef]> {
        match self.get(StateKey::Attachments) {
            Some(StateValue::Attachments(value)) => Some(value.as_slice()),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
