// crates/reply-triage-core/src/core/model.rs
// ============================================================================
// Module: Reply Triage Domain Model
// Description: Action types, branch snapshots, sources, and classification records.
// Purpose: Define the typed vocabulary shared by steps, the driver, and commit.
// Dependencies: serde, time, crate::core::{identifiers, hashing}
// ============================================================================

//! ## Overview
//! The domain model separates what the wizard *reads* (branch snapshots,
//! input sources) from what it *produces* (classification records, delivered
//! date backfills, message dispositions). Branch snapshots are captured once
//! during Basics so applicability never consults live thread state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use time::Date;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::AttachmentId;
use crate::core::identifiers::BranchId;
use crate::core::identifiers::MessageId;
use crate::core::identifiers::ObligeeId;
use crate::core::identifiers::RecordId;
use crate::core::identifiers::ThreadId;

// ============================================================================
// SECTION: Action Types
// ============================================================================

/// Typed event in a branch history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Initial information request sent by the applicant.
    Request,
    /// Obligee asks the applicant to clarify the request.
    ClarificationRequest,
    /// Applicant answers a clarification request.
    ClarificationResponse,
    /// Applicant appeals a decision.
    Appeal,
    /// Obligee confirms receipt of the request.
    Confirmation,
    /// Obligee extends the deadline.
    Extension,
    /// Obligee forwards the request to other obligees.
    Advancement,
    /// Obligee refuses the request by decision.
    Refusal,
    /// Obligee discloses information.
    Disclosure,
    /// Appeal authority returns the case to the obligee.
    Remandment,
    /// Appeal authority affirms the refusal.
    Affirmation,
    /// Appeal authority reverses the refusal.
    Reversion,
    /// Request received by an obligee through advancement.
    AdvancedRequest,
}

impl ActionType {
    /// Action types an obligee reply may be classified as.
    pub const OBLIGEE_ACTIONS: [Self; 9] = [
        Self::ClarificationRequest,
        Self::Confirmation,
        Self::Extension,
        Self::Advancement,
        Self::Refusal,
        Self::Disclosure,
        Self::Remandment,
        Self::Affirmation,
        Self::Reversion,
    ];

    /// Action types an incoming message may be classified as.
    pub const MESSAGE_ACTIONS: [Self; 6] = [
        Self::ClarificationRequest,
        Self::Confirmation,
        Self::Extension,
        Self::Advancement,
        Self::Refusal,
        Self::Disclosure,
    ];

    /// Returns true when the action can result from classifying an obligee reply.
    #[must_use]
    pub fn is_obligee_action(self) -> bool {
        Self::OBLIGEE_ACTIONS.contains(&self)
    }

    /// Returns true when an incoming message may produce this action.
    #[must_use]
    pub fn is_message_action(self) -> bool {
        Self::MESSAGE_ACTIONS.contains(&self)
    }

    /// Returns the stable label for the action type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::ClarificationRequest => "clarification_request",
            Self::ClarificationResponse => "clarification_response",
            Self::Appeal => "appeal",
            Self::Confirmation => "confirmation",
            Self::Extension => "extension",
            Self::Advancement => "advancement",
            Self::Refusal => "refusal",
            Self::Disclosure => "disclosure",
            Self::Remandment => "remandment",
            Self::Affirmation => "affirmation",
            Self::Reversion => "reversion",
            Self::AdvancedRequest => "advanced_request",
        }
    }
}

/// How much of the requested information a decision discloses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureLevel {
    /// Nothing disclosed.
    None,
    /// Part of the information disclosed.
    Partial,
    /// Everything disclosed.
    Full,
}

impl DisclosureLevel {
    /// All levels in presentation order.
    pub const ALL: [Self; 3] = [Self::Full, Self::Partial, Self::None];

    /// Returns the stable label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Partial => "partial",
            Self::Full => "full",
        }
    }
}

/// Legal reason an obligee gives for withholding information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    /// The obligee does not have the information.
    DoesNotHave,
    /// The obligee is not obliged to provide the information.
    DoesNotProvide,
    /// Providing it would require creating new information.
    DoesNotCreate,
    /// Copyright protection.
    Copyright,
    /// Business secret.
    BusinessSecret,
    /// Personal data protection.
    Personal,
    /// Confidentiality.
    Confidential,
    /// Any other reason.
    OtherReason,
}

impl RefusalReason {
    /// All reason codes in presentation order.
    pub const ALL: [Self; 8] = [
        Self::DoesNotHave,
        Self::DoesNotProvide,
        Self::DoesNotCreate,
        Self::Copyright,
        Self::BusinessSecret,
        Self::Personal,
        Self::Confidential,
        Self::OtherReason,
    ];

    /// Returns the stable code for the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DoesNotHave => "does_not_have",
            Self::DoesNotProvide => "does_not_provide",
            Self::DoesNotCreate => "does_not_create",
            Self::Copyright => "copyright",
            Self::BusinessSecret => "business_secret",
            Self::Personal => "personal",
            Self::Confidential => "confidential",
            Self::OtherReason => "other_reason",
        }
    }

    /// Parses a reason code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.as_str() == code)
    }
}

/// How much of an appeal the appeal authority accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    /// The whole appeal was accepted.
    All,
    /// Part of the appeal was accepted.
    Some,
    /// The appeal was rejected.
    None,
}

impl Acceptance {
    /// All choices in presentation order.
    pub const ALL: [Self; 3] = [Self::All, Self::Some, Self::None];

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Some => "some",
            Self::None => "none",
        }
    }
}

/// Terminal result categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// The reply is a typed action.
    Action,
    /// The applicant asked for help.
    Help,
    /// The reply is unrelated to the request.
    Unrelated,
}

impl ResultKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Help => "help",
            Self::Unrelated => "unrelated",
        }
    }
}

// ============================================================================
// SECTION: Thread Snapshots
// ============================================================================

/// Obligee reference resolved through the obligee directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObligeeRef {
    /// Obligee identifier.
    pub obligee_id: ObligeeId,
    /// Display name.
    pub name: String,
}

/// Last recorded action on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastAction {
    /// Action type.
    pub action_type: ActionType,
    /// Legal (effective) date.
    pub legal_date: Date,
    /// Delivery date, when known.
    pub delivered_date: Option<Date>,
}

/// Read-only capture of a branch at the moment Basics was answered.
///
/// # Invariants
/// - `addable` lists every action type the branch accepted at capture time.
/// - Applicability predicates read only this snapshot, never live thread state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSnapshot {
    /// Branch identifier.
    pub branch_id: BranchId,
    /// Obligee the branch is addressed to.
    pub obligee: ObligeeRef,
    /// Action types the branch accepts next.
    pub addable: BTreeSet<ActionType>,
    /// Last recorded action.
    pub last_action: LastAction,
}

impl BranchSnapshot {
    /// Returns true when the branch accepts the action type.
    #[must_use]
    pub fn can_add(&self, action: ActionType) -> bool {
        self.addable.contains(&action)
    }
}

// ============================================================================
// SECTION: Input Sources
// ============================================================================

/// Attachment reference (staged upload or message attachment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Attachment identifier.
    pub attachment_id: AttachmentId,
    /// File name.
    pub name: String,
    /// Content type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
}

/// Parsed incoming message a reply is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    /// Message identifier.
    pub message_id: MessageId,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// Local calendar date the message was processed.
    pub processed_date: Date,
    /// Message attachments.
    pub attachments: Vec<AttachmentRef>,
}

/// Where the reply being classified came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
    /// Staff or applicant entered the reply by hand.
    Manual,
    /// The reply is an already-parsed incoming message.
    Message(MessageSnapshot),
}

impl InputSource {
    /// Returns the source kind folded into accumulated state.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::Manual => SourceKind::Manual,
            Self::Message(_) => SourceKind::Message,
        }
    }

    /// Returns the message snapshot for message sources.
    #[must_use]
    pub const fn message(&self) -> Option<&MessageSnapshot> {
        match self {
            Self::Manual => None,
            Self::Message(message) => Some(message),
        }
    }
}

/// Source discriminator stored in accumulated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Manually entered reply.
    Manual,
    /// Message-derived reply.
    Message,
}

// ============================================================================
// SECTION: Commit Outputs
// ============================================================================

/// Immutable classification of an obligee reply as a typed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// Record identifier derived from the terminal state hash.
    pub record_id: RecordId,
    /// Thread the record belongs to.
    pub thread_id: ThreadId,
    /// Branch the action is recorded on.
    pub branch_id: BranchId,
    /// Action type.
    pub action: ActionType,
    /// Source message, for message-derived replies.
    pub message_id: Option<MessageId>,
    /// Message subject, empty for manual entries.
    pub subject: String,
    /// Message text, empty for manual entries.
    pub content: String,
    /// Obligee file number.
    pub file_number: String,
    /// Delivery date of the reply.
    pub delivered_date: Date,
    /// Legal date of the reply.
    pub legal_date: Date,
    /// Deadline extension in days (extension only).
    pub extension: Option<u8>,
    /// Disclosure level (disclosure, refusal and appeal decisions).
    pub disclosure_level: Option<DisclosureLevel>,
    /// Refusal reasons; `Some(vec![])` when "none" was chosen.
    pub refusal_reasons: Option<Vec<RefusalReason>>,
    /// Advancement targets (advancement only).
    pub advanced_to: Option<Vec<ObligeeRef>>,
    /// Attachments from the message or the staged uploads, never both.
    pub attachments: Vec<AttachmentRef>,
    /// Hash of the terminal accumulated state.
    pub state_hash: HashDigest,
}

/// Delivered-date backfill applied to the branch's prior action on commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredDateBackfill {
    /// Branch whose last action is updated.
    pub branch_id: BranchId,
    /// Type of the updated action.
    pub action_type: ActionType,
    /// Delivered date written onto the action.
    pub delivered_date: Date,
}

/// Disposition tag written onto a source message on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDisposition {
    /// The message was classified as an obligee action.
    ObligeeAction,
    /// The applicant asked for help; the message stays unclassified.
    Unknown,
    /// The message is unrelated to the request.
    Unrelated,
}

impl MessageDisposition {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObligeeAction => "obligee_action",
            Self::Unknown => "unknown",
            Self::Unrelated => "unrelated",
        }
    }
}

/// Disposition of one source message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionRecord {
    /// Tagged message.
    pub message_id: MessageId,
    /// Disposition tag.
    pub disposition: MessageDisposition,
}
