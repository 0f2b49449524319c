// crates/reply-triage-core/src/runtime/validators.rs
// ============================================================================
// Module: Step Validators
// Description: Shared validation fragments, step context, and cleaned input.
// Purpose: Compose reusable checks into per-step cleaning without inheritance.
// Dependencies: time, thiserror, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Several steps share the same rules: three steps collect refusal reasons,
//! two steps check a reply date against the same window, and the advancement
//! targets are checked pairwise. Those rules live here as plain functions so
//! each step composes the fragments it needs. Fragments are pure except where
//! they take a collaborator explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use time::Date;

use crate::core::Acceptance;
use crate::core::ActionType;
use crate::core::AttachmentId;
use crate::core::AttachmentRef;
use crate::core::BranchSnapshot;
use crate::core::DisclosureLevel;
use crate::core::DraftRef;
use crate::core::ErrorCode;
use crate::core::FormReader;
use crate::core::InputSource;
use crate::core::LastAction;
use crate::core::ObligeeRef;
use crate::core::RefusalReason;
use crate::core::ValidationErrors;
use crate::interfaces::AttachmentError;
use crate::interfaces::AttachmentStaging;
use crate::interfaces::DirectoryError;
use crate::interfaces::ObligeeDirectory;

// ============================================================================
// SECTION: Settings and Context
// ============================================================================

/// Default staleness bound in calendar months.
pub const DEFAULT_STALENESS_MONTHS: u32 = 1;
/// Default maximum file number length in characters.
pub const DEFAULT_FILE_NUMBER_MAX_LEN: usize = 255;
/// Special reason code that excludes every other code.
pub const NO_REASON_CODE: &str = "none";

/// Deployment-level validation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSettings {
    /// How many calendar months back a reply date may lie.
    pub staleness_months: u32,
    /// Maximum file number length in characters.
    pub file_number_max_len: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            staleness_months: DEFAULT_STALENESS_MONTHS,
            file_number_max_len: DEFAULT_FILE_NUMBER_MAX_LEN,
        }
    }
}

/// Everything a step may consult while cleaning input.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Local calendar day of the submission.
    pub today: Date,
    /// Input source of the instance.
    pub source: &'a InputSource,
    /// Draft holder for staged attachments.
    pub draft: &'a DraftRef,
    /// Current branches of the thread.
    pub branches: &'a [BranchSnapshot],
    /// Pending obligee lookup.
    pub obligees: &'a dyn ObligeeDirectory,
    /// Staged uploads.
    pub attachments: &'a dyn AttachmentStaging,
    /// Validation settings.
    pub settings: &'a ValidationSettings,
}

// ============================================================================
// SECTION: Cleaned Input
// ============================================================================

/// Normalized input produced by a step's cleaner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanedInput {
    /// Basics answers.
    Basics {
        /// Chosen branch, captured as a snapshot.
        branch: BranchSnapshot,
        /// Delivery date (the message's processed date for message sources).
        delivered_date: Date,
        /// Staged attachments; `None` for message sources.
        attachments: Option<Vec<AttachmentRef>>,
    },
    /// Yes/no answer.
    Answer(bool),
    /// Disclosure level.
    Disclosure(DisclosureLevel),
    /// Refusal reasons; empty when "none" was chosen.
    Reasons(Vec<RefusalReason>),
    /// Advancement answer and resolved targets.
    Advancement {
        /// Whether the reply is an advancement.
        advancement: bool,
        /// Present targets in field order.
        targets: Vec<ObligeeRef>,
    },
    /// Extension answer and length.
    Extension {
        /// Whether the reply extends the deadline.
        extension: bool,
        /// Extension length in days.
        days: Option<u8>,
    },
    /// Appeal acceptance.
    Acceptance(Acceptance),
    /// Required help text.
    HelpText(String),
    /// Catch-all answer.
    NotCategorized {
        /// Whether the applicant wants help.
        wants_help: bool,
        /// Help text when help was requested.
        help_request: Option<String>,
    },
    /// Categorized answers.
    Categorized {
        /// Legal date of the reply.
        legal_date: Date,
        /// Obligee file number, empty when not given.
        file_number: String,
        /// Delivered date to backfill onto the branch's last action.
        last_action_delivered_date: Option<Date>,
    },
}

/// Errors raised while cleaning step input.
#[derive(Debug, Error)]
pub enum CleanError {
    /// Field-scoped, user-correctable errors.
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),
    /// Obligee directory failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// Attachment staging failed.
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    /// The accumulated state lacks a value the step depends on.
    #[error("inconsistent accumulated state: {0}")]
    State(String),
}

impl From<ValidationErrors> for CleanError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Invalid(errors)
    }
}

// ============================================================================
// SECTION: Reasons Fragment
// ============================================================================

/// Returns the reason codes offered by the reasons steps, "none" last.
#[must_use]
pub fn offered_reason_codes() -> Vec<&'static str> {
    let mut codes: Vec<&'static str> = RefusalReason::ALL.iter().map(|reason| reason.as_str()).collect();
    codes.push(NO_REASON_CODE);
    codes
}

/// Reads a reasons field where "none" must be chosen alone.
pub fn read_reasons(form: &mut FormReader<'_>, field: &str) -> Option<Vec<RefusalReason>> {
    let codes = form.multi_choice(field, &offered_reason_codes(), true)?;
    normalize_reasons(&codes).map_or_else(
        |code| {
            form.add_error(field, code);
            None
        },
        Some,
    )
}

/// Normalizes submitted reason codes.
///
/// # Errors
///
/// Returns [`ErrorCode::NoneContradiction`] when "none" is combined with any
/// other code and [`ErrorCode::InvalidChoice`] for unknown codes.
pub fn normalize_reasons(codes: &[String]) -> Result<Vec<RefusalReason>, ErrorCode> {
    if codes.iter().any(|code| code == NO_REASON_CODE) {
        return if codes.len() == 1 { Ok(Vec::new()) } else { Err(ErrorCode::NoneContradiction) };
    }
    let mut reasons = Vec::with_capacity(codes.len());
    for code in codes {
        let reason = RefusalReason::from_code(code).ok_or(ErrorCode::InvalidChoice)?;
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    }
    Ok(reasons)
}

// ============================================================================
// SECTION: Advancement Targets Fragment
// ============================================================================

/// Checks advancement targets against the branch's obligee and each other.
///
/// Returns `(index, code)` pairs; a duplicate is reported on the later field.
#[must_use]
pub fn check_advancement_targets(
    own_obligee: &ObligeeRef,
    targets: &[Option<ObligeeRef>],
) -> Vec<(usize, ErrorCode)> {
    let mut errors = Vec::new();
    for (index, target) in targets.iter().enumerate() {
        let Some(target) = target else {
            continue;
        };
        if target.obligee_id == own_obligee.obligee_id {
            errors.push((index, ErrorCode::SameObligee));
            continue;
        }
        let repeated = targets[.. index]
            .iter()
            .flatten()
            .any(|earlier| earlier.obligee_id == target.obligee_id);
        if repeated {
            errors.push((index, ErrorCode::DuplicateObligee));
        }
    }
    errors
}

/// Resolves an obligee name through the directory, recording unknown names.
///
/// # Errors
///
/// Returns [`DirectoryError`] when the directory cannot be queried.
pub fn resolve_obligee(
    form: &mut FormReader<'_>,
    field: &str,
    directory: &dyn ObligeeDirectory,
) -> Result<Option<ObligeeRef>, DirectoryError> {
    let Some(name) = form.text(field, None, false) else {
        return Ok(None);
    };
    let found = directory.find_pending_by_name(&name)?;
    if found.is_none() {
        form.add_error(field, ErrorCode::InvalidObligeeName);
    }
    Ok(found)
}

// ============================================================================
// SECTION: Attachments Fragment
// ============================================================================

/// Resolves attachment ids against the uploads staged for the draft holder.
///
/// Returns `Ok(None)` when any id is not staged for `(session, draft)`.
///
/// # Errors
///
/// Returns [`AttachmentError`] when the staging area cannot be read.
pub fn resolve_staged(
    staging: &dyn AttachmentStaging,
    draft: &DraftRef,
    ids: &[AttachmentId],
) -> Result<Option<Vec<AttachmentRef>>, AttachmentError> {
    let staged = staging.staged(draft)?;
    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        match staged.iter().find(|attachment| &attachment.attachment_id == id) {
            Some(attachment) => resolved.push(attachment.clone()),
            None => return Ok(None),
        }
    }
    Ok(Some(resolved))
}

// ============================================================================
// SECTION: Last Action Backfill Fragment
// ============================================================================

/// Returns the label key of the last-action delivered-date field, or `None`
/// when the field is not offered for this last action.
#[must_use]
pub fn backfill_label(last_action: &LastAction) -> Option<&'static str> {
    if last_action.delivered_date.is_some() {
        return None;
    }
    match last_action.action_type {
        ActionType::Request => Some("obligee_action.categorized.last_action_delivered_date.request"),
        ActionType::ClarificationResponse => {
            Some("obligee_action.categorized.last_action_delivered_date.clarification_response")
        }
        ActionType::Appeal => Some("obligee_action.categorized.last_action_delivered_date.appeal"),
        ActionType::AdvancedRequest => {
            Some("obligee_action.categorized.last_action_delivered_date.advanced_request")
        }
        _ => None,
    }
}

/// Checks a backfilled delivered date against the legal dates and today.
///
/// # Errors
///
/// Returns the first violated rule: [`ErrorCode::NewerThanLegalDate`],
/// [`ErrorCode::OlderThanLastActionLegalDate`], or [`ErrorCode::FromFuture`].
pub fn check_backfill_date(
    date: Date,
    legal_date: Option<Date>,
    last_action: &LastAction,
    today: Date,
) -> Result<(), ErrorCode> {
    if legal_date.is_some_and(|legal| date > legal) {
        return Err(ErrorCode::NewerThanLegalDate);
    }
    if date < last_action.legal_date {
        return Err(ErrorCode::OlderThanLastActionLegalDate);
    }
    if date > today {
        return Err(ErrorCode::FromFuture);
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
