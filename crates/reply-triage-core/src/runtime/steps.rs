// crates/reply-triage-core/src/runtime/steps.rs
// ============================================================================
// Module: Step Behaviors
// Description: Field schemas, cleaners, and projectors for each step variant.
// Purpose: Implement the questions of the obligee-action classification tree.
// Dependencies: serde_json, crate::{core, runtime::validators}
// ============================================================================

//! ## Overview
//! A [`StepBehavior`] is the tagged variant behind a catalog entry. Each
//! variant declares its fields, cleans raw input into a [`CleanedInput`], and
//! projects cleaned input into a [`StatePatch`]. Yes/no questions that differ
//! only in field name and outcome share one variant; the reasons variant is
//! reused by three steps.
//!
//! Projections are pure: given the same cleaned input and state they return
//! the same patch, which is what makes re-submission and replay safe.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::Acceptance;
use crate::core::AccumulatedState;
use crate::core::ActionType;
use crate::core::AttachmentId;
use crate::core::BranchSnapshot;
use crate::core::Choice;
use crate::core::DisclosureLevel;
use crate::core::ErrorCode;
use crate::core::FieldKind;
use crate::core::FieldSpec;
use crate::core::FormReader;
use crate::core::InputSource;
use crate::core::RawInput;
use crate::core::ReplyDateWindow;
use crate::core::ResultKind;
use crate::core::SourceKind;
use crate::core::StateKey;
use crate::core::StatePatch;
use crate::core::StateValue;
use crate::runtime::validators::CleanError;
use crate::runtime::validators::CleanedInput;
use crate::runtime::validators::StepContext;
use crate::runtime::validators::ValidationSettings;
use crate::runtime::validators::backfill_label;
use crate::runtime::validators::check_advancement_targets;
use crate::runtime::validators::check_backfill_date;
use crate::runtime::validators::offered_reason_codes;
use crate::runtime::validators::read_reasons;
use crate::runtime::validators::resolve_obligee;
use crate::runtime::validators::resolve_staged;

// ============================================================================
// SECTION: Field Names
// ============================================================================

/// Basics: branch id.
pub const FIELD_BRANCH: &str = "branch";
/// Basics: delivery date.
pub const FIELD_DELIVERED_DATE: &str = "delivered_date";
/// Basics: staged attachment ids.
pub const FIELD_ATTACHMENTS: &str = "attachments";
/// Reasons steps: reason codes.
pub const FIELD_REFUSAL_REASON: &str = "refusal_reason";
/// `IsAdvancement`: answer.
pub const FIELD_IS_ADVANCEMENT: &str = "is_advancement";
/// `IsAdvancement`: target obligee names.
pub const FIELD_ADVANCED_TO: [&str; 3] = ["advanced_to_1", "advanced_to_2", "advanced_to_3"];
/// `IsExtension`: answer.
pub const FIELD_IS_EXTENSION: &str = "is_extension";
/// `IsExtension`: length in days.
pub const FIELD_EXTENSION: &str = "extension";
/// `WasAccepted`: acceptance.
pub const FIELD_WAS_ACCEPTED: &str = "was_accepted";
/// `WasReturned`: answer.
pub const FIELD_WAS_RETURNED: &str = "was_returned";
/// Help steps: free text.
pub const FIELD_HELP_REQUEST: &str = "help_request";
/// `NotCategorized`: help or unrelated.
pub const FIELD_WANTS_HELP: &str = "wants_help";
/// Categorized: legal date.
pub const FIELD_LEGAL_DATE: &str = "legal_date";
/// Categorized: file number.
pub const FIELD_FILE_NUMBER: &str = "file_number";
/// Categorized: delivered date of the branch's last action.
pub const FIELD_LAST_ACTION_DELIVERED_DATE: &str = "last_action_delivered_date";

/// Extension bounds and initial value, in days.
const EXTENSION_MIN: i64 = 2;
/// Upper extension bound.
const EXTENSION_MAX: i64 = 15;
/// Initial extension value.
const EXTENSION_INITIAL: i64 = 8;

// ============================================================================
// SECTION: Step Behavior
// ============================================================================

/// Behavior of one catalog step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepBehavior {
    /// Branch, delivery date, and attachments.
    Basics,
    /// Yes/no question recorded under `signal`; yes may settle an action.
    YesNo {
        /// Field name.
        field: &'static str,
        /// State key the answer is recorded under.
        signal: StateKey,
        /// Action settled by a yes answer.
        on_yes: Option<ActionType>,
    },
    /// Disclosure level question; full may settle an action.
    Disclosure {
        /// Field name.
        field: &'static str,
        /// Action settled by a full disclosure.
        on_full: Option<ActionType>,
    },
    /// Reasons collection; may settle an action.
    Reasons {
        /// Action settled once reasons are given.
        settles: Option<ActionType>,
    },
    /// Advancement question with up to three targets.
    Advancement,
    /// Extension question with a length.
    Extension,
    /// Appeal acceptance question.
    WasAccepted,
    /// Returned-to-obligee question.
    WasReturned,
    /// Required help request closing an unclassifiable appeal decision.
    InvalidReversion,
    /// Catch-all: help request or unrelated.
    NotCategorized,
    /// Legal date, file number, and delivered-date backfill.
    Categorized,
}

/// Label key for a field of a step.
fn label(step: &str, field: &str) -> String {
    format!("obligee_action.{step}.{field}")
}

/// Choices of a disclosure level field.
fn disclosure_choices(field: &str) -> Vec<Choice> {
    DisclosureLevel::ALL
        .iter()
        .map(|level| Choice::new(level.as_str(), label(field, level.as_str())))
        .collect()
}

/// Parse table of disclosure levels.
const DISCLOSURE_OPTIONS: [(&str, DisclosureLevel); 3] = [
    ("full", DisclosureLevel::Full),
    ("partial", DisclosureLevel::Partial),
    ("none", DisclosureLevel::None),
];

/// Parse table of appeal acceptance.
const ACCEPTANCE_OPTIONS: [(&str, Acceptance); 3] =
    [("all", Acceptance::All), ("some", Acceptance::Some), ("none", Acceptance::None)];

impl StepBehavior {
    // ------------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------------

    /// Declares the fields the step renders for the given state.
    #[must_use]
    pub fn fields(
        &self,
        state: &AccumulatedState,
        branches: &[BranchSnapshot],
        settings: &ValidationSettings,
    ) -> Vec<FieldSpec> {
        match self {
            Self::Basics => basics_fields(state, branches),
            Self::YesNo {
                field, ..
            } => vec![FieldSpec::new(field, FieldKind::YesNo, true, label(field, "label"))],
            Self::Disclosure {
                field, ..
            } => vec![FieldSpec::new(
                field,
                FieldKind::Choice {
                    choices: disclosure_choices(field),
                },
                true,
                label(field, "label"),
            )],
            Self::Reasons {
                ..
            } => vec![FieldSpec::new(
                FIELD_REFUSAL_REASON,
                FieldKind::MultiChoice {
                    choices: offered_reason_codes()
                        .into_iter()
                        .map(|code| Choice::new(code, label("reasons", code)))
                        .collect(),
                },
                true,
                label("reasons", FIELD_REFUSAL_REASON),
            )],
            Self::Advancement => {
                let mut fields = vec![FieldSpec::new(
                    FIELD_IS_ADVANCEMENT,
                    FieldKind::YesNo,
                    true,
                    label(FIELD_IS_ADVANCEMENT, "label"),
                )];
                fields.extend(FIELD_ADVANCED_TO.iter().map(|name| {
                    FieldSpec::new(name, FieldKind::Obligee, false, label(FIELD_IS_ADVANCEMENT, name))
                }));
                fields
            }
            Self::Extension => vec![
                FieldSpec::new(FIELD_IS_EXTENSION, FieldKind::YesNo, true, label(FIELD_IS_EXTENSION, "label")),
                FieldSpec::new(
                    FIELD_EXTENSION,
                    FieldKind::Integer {
                        min: EXTENSION_MIN,
                        max: EXTENSION_MAX,
                    },
                    false,
                    label(FIELD_IS_EXTENSION, FIELD_EXTENSION),
                )
                .with_initial(Value::from(EXTENSION_INITIAL)),
            ],
            Self::WasAccepted => vec![FieldSpec::new(
                FIELD_WAS_ACCEPTED,
                FieldKind::Choice {
                    choices: ACCEPTANCE_OPTIONS
                        .iter()
                        .map(|(code, _)| Choice::new(*code, label(FIELD_WAS_ACCEPTED, code)))
                        .collect(),
                },
                true,
                label(FIELD_WAS_ACCEPTED, "label"),
            )],
            Self::WasReturned => vec![FieldSpec::new(
                FIELD_WAS_RETURNED,
                FieldKind::YesNo,
                true,
                label(FIELD_WAS_RETURNED, "label"),
            )],
            Self::InvalidReversion => vec![help_field("invalid_reversion", true)],
            Self::NotCategorized => vec![
                FieldSpec::new(FIELD_WANTS_HELP, FieldKind::YesNo, true, label("not_categorized", FIELD_WANTS_HELP)),
                help_field("not_categorized", false),
            ],
            Self::Categorized => categorized_fields(state, settings),
        }
    }

    // ------------------------------------------------------------------------
    // Cleaning
    // ------------------------------------------------------------------------

    /// Validates raw input against the accumulated state.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError::Invalid`] for user-correctable problems and other
    /// [`CleanError`] variants when a collaborator or the state is unusable.
    pub fn clean(
        &self,
        input: &RawInput,
        state: &AccumulatedState,
        ctx: &StepContext<'_>,
    ) -> Result<CleanedInput, CleanError> {
        let mut form = FormReader::new(input);
        match self {
            Self::Basics => clean_basics(form, ctx),
            Self::YesNo {
                field, ..
            } => {
                let answer = form.yes_no(field, true);
                form.finish()?;
                answer.map(CleanedInput::Answer).ok_or_else(|| missing(field))
            }
            Self::Disclosure {
                field, ..
            } => {
                let level = form.choice(field, &DISCLOSURE_OPTIONS, true);
                form.finish()?;
                level.map(CleanedInput::Disclosure).ok_or_else(|| missing(field))
            }
            Self::Reasons {
                ..
            } => {
                let reasons = read_reasons(&mut form, FIELD_REFUSAL_REASON);
                form.finish()?;
                reasons.map(CleanedInput::Reasons).ok_or_else(|| missing(FIELD_REFUSAL_REASON))
            }
            Self::Advancement => clean_advancement(form, state, ctx),
            Self::Extension => {
                let extension = form.yes_no(FIELD_IS_EXTENSION, true);
                let days = form.integer(FIELD_EXTENSION, EXTENSION_MIN, EXTENSION_MAX, false);
                if extension == Some(true) && days.is_none() && !form.has_error(FIELD_EXTENSION) {
                    form.add_error(FIELD_EXTENSION, ErrorCode::Required);
                }
                form.finish()?;
                let extension = extension.ok_or_else(|| missing(FIELD_IS_EXTENSION))?;
                let days = days.and_then(|days| u8::try_from(days).ok());
                Ok(CleanedInput::Extension {
                    extension,
                    days,
                })
            }
            Self::WasAccepted => {
                let acceptance = form.choice(FIELD_WAS_ACCEPTED, &ACCEPTANCE_OPTIONS, true);
                form.finish()?;
                acceptance.map(CleanedInput::Acceptance).ok_or_else(|| missing(FIELD_WAS_ACCEPTED))
            }
            Self::WasReturned => {
                let answer = form.yes_no(FIELD_WAS_RETURNED, true);
                form.finish()?;
                answer.map(CleanedInput::Answer).ok_or_else(|| missing(FIELD_WAS_RETURNED))
            }
            Self::InvalidReversion => {
                let text = form.text(FIELD_HELP_REQUEST, None, true);
                form.finish()?;
                text.map(CleanedInput::HelpText).ok_or_else(|| missing(FIELD_HELP_REQUEST))
            }
            Self::NotCategorized => {
                let wants_help = form.yes_no(FIELD_WANTS_HELP, true);
                let help_request = form.text(FIELD_HELP_REQUEST, None, false);
                if wants_help == Some(true) && help_request.is_none() && !form.has_error(FIELD_HELP_REQUEST) {
                    form.add_error(FIELD_HELP_REQUEST, ErrorCode::Required);
                }
                form.finish()?;
                let wants_help = wants_help.ok_or_else(|| missing(FIELD_WANTS_HELP))?;
                Ok(CleanedInput::NotCategorized {
                    wants_help,
                    help_request: if wants_help { help_request } else { None },
                })
            }
            Self::Categorized => clean_categorized(form, state, ctx),
        }
    }

    // ------------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------------

    /// Projects cleaned input into the values merged into state.
    ///
    /// Returns `None` when the cleaned input belongs to a different behavior.
    #[must_use]
    pub fn project(&self, cleaned: &CleanedInput, state: &AccumulatedState) -> Option<StatePatch> {
        let mut patch = StatePatch::new();
        match (self, cleaned) {
            (
                Self::Basics,
                CleanedInput::Basics {
                    branch,
                    delivered_date,
                    attachments,
                },
            ) => {
                patch.set(StateKey::Branch, StateValue::Branch(branch.clone()));
                patch.set(StateKey::DeliveredDate, StateValue::Date(*delivered_date));
                if let Some(attachments) = attachments {
                    patch.set(StateKey::Attachments, StateValue::Attachments(attachments.clone()));
                }
            }
            (
                Self::YesNo {
                    signal,
                    on_yes,
                    ..
                },
                CleanedInput::Answer(answer),
            ) => {
                patch.set(*signal, StateValue::Bool(*answer));
                if let (true, Some(action)) = (*answer, on_yes) {
                    patch.set_action(*action);
                }
            }
            (
                Self::Disclosure {
                    on_full, ..
                },
                CleanedInput::Disclosure(level),
            ) => {
                patch.set(StateKey::DisclosureLevel, StateValue::Disclosure(*level));
                if let (DisclosureLevel::Full, Some(action)) = (level, on_full) {
                    patch.set_action(*action);
                }
            }
            (
                Self::Reasons {
                    settles,
                },
                CleanedInput::Reasons(reasons),
            ) => {
                patch.set(StateKey::RefusalReasons, StateValue::Reasons(reasons.clone()));
                if let Some(action) = settles {
                    patch.set_action(*action);
                }
            }
            (
                Self::Advancement,
                CleanedInput::Advancement {
                    advancement,
                    targets,
                },
            ) => {
                patch.set(StateKey::IsAdvancement, StateValue::Bool(*advancement));
                if *advancement {
                    patch.set_action(ActionType::Advancement);
                    patch.set(StateKey::AdvancedTo, StateValue::Obligees(targets.clone()));
                }
            }
            (
                Self::Extension,
                CleanedInput::Extension {
                    extension,
                    days,
                },
            ) => {
                patch.set(StateKey::IsExtension, StateValue::Bool(*extension));
                if *extension {
                    patch.set_action(ActionType::Extension);
                    if let Some(days) = days {
                        patch.set(StateKey::Extension, StateValue::Extension(*days));
                    }
                }
            }
            (Self::WasAccepted, CleanedInput::Acceptance(acceptance)) => {
                patch.set(StateKey::WasAccepted, StateValue::Acceptance(*acceptance));
                if *acceptance == Acceptance::None {
                    patch.set_action(ActionType::Affirmation);
                }
            }
            (Self::WasReturned, CleanedInput::Answer(returned)) => {
                patch.set(StateKey::WasReturned, StateValue::Bool(*returned));
                let level = state.disclosure_level().unwrap_or(DisclosureLevel::None);
                if *returned {
                    patch.set_action(ActionType::Remandment);
                } else if level == DisclosureLevel::None {
                    patch.set(StateKey::Result, StateValue::Result(ResultKind::Help));
                } else {
                    patch.set_action(ActionType::Reversion);
                }
            }
            (Self::InvalidReversion, CleanedInput::HelpText(text)) => {
                patch.set(StateKey::Result, StateValue::Result(ResultKind::Help));
                patch.set(StateKey::HelpRequest, StateValue::Text(text.clone()));
            }
            (
                Self::NotCategorized,
                CleanedInput::NotCategorized {
                    wants_help,
                    help_request,
                },
            ) => {
                if *wants_help {
                    patch.set(StateKey::Result, StateValue::Result(ResultKind::Help));
                    let text = help_request.clone().unwrap_or_default();
                    patch.set(StateKey::HelpRequest, StateValue::Text(text));
                } else {
                    patch.set(StateKey::Result, StateValue::Result(ResultKind::Unrelated));
                }
            }
            (
                Self::Categorized,
                CleanedInput::Categorized {
                    legal_date,
                    file_number,
                    last_action_delivered_date,
                },
            ) => {
                patch.set(StateKey::LegalDate, StateValue::Date(*legal_date));
                patch.set(StateKey::FileNumber, StateValue::Text(file_number.clone()));
                if let Some(date) = last_action_delivered_date {
                    patch.set(StateKey::LastActionDeliveredDate, StateValue::Date(*date));
                }
            }
            _ => return None,
        }
        Some(patch)
    }
}

// ============================================================================
// SECTION: Per-Step Helpers
// ============================================================================

/// Error for a value missing after a form reported no errors.
fn missing(field: &str) -> CleanError {
    CleanError::State(format!("field {field} missing after successful validation"))
}

/// Free-text help field.
fn help_field(step: &str, required: bool) -> FieldSpec {
    FieldSpec::new(
        FIELD_HELP_REQUEST,
        FieldKind::Text {
            max_len: None,
            multiline: true,
        },
        required,
        label(step, FIELD_HELP_REQUEST),
    )
}

/// Basics fields; date and attachments only for manual entry.
fn basics_fields(state: &AccumulatedState, branches: &[BranchSnapshot]) -> Vec<FieldSpec> {
    let choices: Vec<Choice> = branches
        .iter()
        .map(|branch| Choice::new(branch.branch_id.as_str(), branch.obligee.name.clone()))
        .collect();
    let mut branch = FieldSpec::new(
        FIELD_BRANCH,
        FieldKind::Choice {
            choices,
        },
        true,
        label("basics", FIELD_BRANCH),
    );
    if let [only] = branches {
        branch = branch.with_initial(Value::from(only.branch_id.as_str()));
    }
    let mut fields = vec![branch];
    if state.source() != Some(SourceKind::Message) {
        fields.push(FieldSpec::new(FIELD_DELIVERED_DATE, FieldKind::Date, true, label("basics", FIELD_DELIVERED_DATE)));
        fields.push(FieldSpec::new(FIELD_ATTACHMENTS, FieldKind::Attachments, false, label("basics", FIELD_ATTACHMENTS)));
    }
    fields
}

/// Cleans Basics input.
fn clean_basics(mut form: FormReader<'_>, ctx: &StepContext<'_>) -> Result<CleanedInput, CleanError> {
    let branch = form.text(FIELD_BRANCH, None, true).and_then(|id| {
        let found = ctx.branches.iter().find(|branch| branch.branch_id.as_str() == id).cloned();
        if found.is_none() {
            form.add_error(FIELD_BRANCH, ErrorCode::UnknownBranch);
        }
        found
    });

    let (delivered_date, attachments) = match ctx.source {
        InputSource::Message(message) => (Some(message.processed_date), None),
        InputSource::Manual => {
            let delivered_date = form.date(FIELD_DELIVERED_DATE, true);
            if let Some(date) = delivered_date {
                let window = ReplyDateWindow {
                    previous_legal_date: branch.as_ref().map(|branch| branch.last_action.legal_date),
                    today: ctx.today,
                    staleness_months: ctx.settings.staleness_months,
                };
                if let Err(code) = window.check(date) {
                    form.add_error(FIELD_DELIVERED_DATE, code);
                }
            }
            let ids: Vec<AttachmentId> = form
                .string_list(FIELD_ATTACHMENTS, false)
                .unwrap_or_default()
                .into_iter()
                .map(AttachmentId::new)
                .collect();
            let attachments = if ids.is_empty() {
                Vec::new()
            } else {
                resolve_staged(ctx.attachments, ctx.draft, &ids)?.unwrap_or_else(|| {
                    form.add_error(FIELD_ATTACHMENTS, ErrorCode::Invalid);
                    Vec::new()
                })
            };
            (delivered_date, Some(attachments))
        }
    };

    form.finish()?;
    let branch = branch.ok_or_else(|| missing(FIELD_BRANCH))?;
    let delivered_date = delivered_date.ok_or_else(|| missing(FIELD_DELIVERED_DATE))?;
    Ok(CleanedInput::Basics {
        branch,
        delivered_date,
        attachments,
    })
}

/// Cleans `IsAdvancement` input.
fn clean_advancement(
    mut form: FormReader<'_>,
    state: &AccumulatedState,
    ctx: &StepContext<'_>,
) -> Result<CleanedInput, CleanError> {
    let own = state
        .branch()
        .map(|branch| branch.obligee.clone())
        .ok_or_else(|| CleanError::State("advancement without a captured branch".to_string()))?;
    let advancement = form.yes_no(FIELD_IS_ADVANCEMENT, true);
    let mut targets = Vec::with_capacity(FIELD_ADVANCED_TO.len());
    for field in FIELD_ADVANCED_TO {
        targets.push(resolve_obligee(&mut form, field, ctx.obligees)?);
    }
    if advancement == Some(true) && targets.iter().all(Option::is_none) && !form.has_error(FIELD_ADVANCED_TO[0]) {
        form.add_error(FIELD_ADVANCED_TO[0], ErrorCode::Required);
    }
    for (index, code) in check_advancement_targets(&own, &targets) {
        form.add_error(FIELD_ADVANCED_TO[index], code);
    }
    form.finish()?;
    let advancement = advancement.ok_or_else(|| missing(FIELD_IS_ADVANCEMENT))?;
    Ok(CleanedInput::Advancement {
        advancement,
        targets: targets.into_iter().flatten().collect(),
    })
}

/// Categorized fields; the backfill field only when the last action lacks a delivered date.
fn categorized_fields(state: &AccumulatedState, settings: &ValidationSettings) -> Vec<FieldSpec> {
    let mut fields = vec![
        FieldSpec::new(FIELD_LEGAL_DATE, FieldKind::Date, true, label("categorized", FIELD_LEGAL_DATE)),
        FieldSpec::new(
            FIELD_FILE_NUMBER,
            FieldKind::Text {
                max_len: Some(settings.file_number_max_len),
                multiline: false,
            },
            false,
            label("categorized", FIELD_FILE_NUMBER),
        ),
    ];
    if let Some(label_key) = state.branch().and_then(|branch| backfill_label(&branch.last_action)) {
        fields.push(FieldSpec::new(FIELD_LAST_ACTION_DELIVERED_DATE, FieldKind::Date, false, label_key));
    }
    fields
}

/// Cleans Categorized input.
fn clean_categorized(
    mut form: FormReader<'_>,
    state: &AccumulatedState,
    ctx: &StepContext<'_>,
) -> Result<CleanedInput, CleanError> {
    let branch = state
        .branch()
        .ok_or_else(|| CleanError::State("categorized without a captured branch".to_string()))?;
    let delivered_date = state
        .date(StateKey::DeliveredDate)
        .ok_or_else(|| CleanError::State("categorized without a delivered date".to_string()))?;

    let legal_date = form.date(FIELD_LEGAL_DATE, true);
    if let Some(date) = legal_date {
        let window = ReplyDateWindow {
            previous_legal_date: Some(branch.last_action.legal_date),
            today: ctx.today,
            staleness_months: ctx.settings.staleness_months,
        };
        let checked = if date > delivered_date {
            Err(ErrorCode::NewerThanDeliveredDate)
        } else {
            window.check(date)
        };
        if let Err(code) = checked {
            form.add_error(FIELD_LEGAL_DATE, code);
        }
    }
    let file_number =
        form.text(FIELD_FILE_NUMBER, Some(ctx.settings.file_number_max_len), false).unwrap_or_default();

    let mut last_action_delivered_date = None;
    if backfill_label(&branch.last_action).is_some() {
        last_action_delivered_date = form.date(FIELD_LAST_ACTION_DELIVERED_DATE, false);
        if let Some(date) = last_action_delivered_date
            && let Err(code) = check_backfill_date(date, legal_date, &branch.last_action, ctx.today)
        {
            form.add_error(FIELD_LAST_ACTION_DELIVERED_DATE, code);
        }
    }

    form.finish()?;
    let legal_date = legal_date.ok_or_else(|| missing(FIELD_LEGAL_DATE))?;
    Ok(CleanedInput::Categorized {
        legal_date,
        file_number,
        last_action_delivered_date,
    })
}
