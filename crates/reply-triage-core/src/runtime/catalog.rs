// crates/reply-triage-core/src/runtime/catalog.rs
// ============================================================================
// Module: Step Catalog
// Description: Ordered step definitions, applicability predicates, and the resolver.
// Purpose: Decide which question comes next from the accumulated state alone.
// Dependencies: serde, thiserror, crate::{core, runtime::steps}
// ============================================================================

//! ## Overview
//! The catalog is an ordered list of [`StepDefinition`]s. Each definition
//! pairs a [`StepBehavior`] with an applicability [`Requirement`] over
//! [`StatePredicate`] leaves. Resolution is a pure function of the catalog,
//! the accumulated state, and the answered step keys: the first applicable,
//! unanswered step wins.
//!
//! Security posture: the resolver reads only the captured branch snapshot,
//! never live thread state, so resolution is stable across requests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AccumulatedState;
use crate::core::ActionType;
use crate::core::BranchSnapshot;
use crate::core::DisclosureLevel;
use crate::core::FieldSpec;
use crate::core::PredicateEval;
use crate::core::RawInput;
use crate::core::Requirement;
use crate::core::ResultKind;
use crate::core::SourceKind;
use crate::core::StateKey;
use crate::core::StatePatch;
use crate::core::StepKey;
use crate::runtime::steps::StepBehavior;
use crate::runtime::validators::CleanError;
use crate::runtime::validators::CleanedInput;
use crate::runtime::validators::StepContext;
use crate::runtime::validators::ValidationSettings;

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// Leaf predicate over accumulated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "predicate", rename_all = "snake_case")]
pub enum StatePredicate {
    /// No result has been settled.
    ResultAbsent,
    /// The settled result equals the kind.
    ResultIs {
        /// Expected result.
        result: ResultKind,
    },
    /// The settled action equals the type.
    ActionIs {
        /// Expected action.
        action: ActionType,
    },
    /// The captured branch accepts the action type.
    BranchCan {
        /// Action the branch must accept.
        action: ActionType,
    },
    /// The reply came from the given source kind.
    SourceIs {
        /// Expected source.
        source: SourceKind,
    },
    /// A yes/no flag, or `default` when unanswered.
    FlagOr {
        /// Flag key.
        key: StateKey,
        /// Value assumed when the flag is absent.
        default: bool,
    },
    /// The recorded disclosure level equals the level.
    DisclosureIs {
        /// Expected level.
        level: DisclosureLevel,
    },
}

impl PredicateEval for StatePredicate {
    type Subject = AccumulatedState;

    fn eval(&self, state: &AccumulatedState) -> bool {
        match *self {
            Self::ResultAbsent => state.result().is_none(),
            Self::ResultIs {
                result,
            } => state.result() == Some(result),
            Self::ActionIs {
                action,
            } => state.action() == Some(action),
            Self::BranchCan {
                action,
            } => state.branch().is_some_and(|branch| branch.can_add(action)),
            Self::SourceIs {
                source,
            } => state.source() == Some(source),
            Self::FlagOr {
                key,
                default,
            } => state.flag_or(key, default),
            Self::DisclosureIs {
                level,
            } => state.disclosure_level() == Some(level),
        }
    }
}

/// Applicability condition of a step.
pub type Applicability = Requirement<StatePredicate>;

// ============================================================================
// SECTION: Step Definitions
// ============================================================================

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    /// Stable step key.
    pub key: StepKey,
    /// When the step is offered.
    pub applicability: Applicability,
    /// Schema, cleaner, and projector.
    pub behavior: StepBehavior,
}

impl StepDefinition {
    /// Returns true when the step applies to the state.
    #[must_use]
    pub fn applicable(&self, state: &AccumulatedState) -> bool {
        self.applicability.eval(state)
    }

    /// Declares the step's fields for the state.
    #[must_use]
    pub fn fields(
        &self,
        state: &AccumulatedState,
        branches: &[BranchSnapshot],
        settings: &ValidationSettings,
    ) -> Vec<FieldSpec> {
        self.behavior.fields(state, branches, settings)
    }

    /// Cleans raw input for the step.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError`] when the input is invalid or a collaborator fails.
    pub fn clean(
        &self,
        input: &RawInput,
        state: &AccumulatedState,
        ctx: &StepContext<'_>,
    ) -> Result<CleanedInput, CleanError> {
        self.behavior.clean(input, state, ctx)
    }

    /// Projects cleaned input into state values.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError::State`] when the cleaned input was produced by a
    /// different step.
    pub fn values(&self, cleaned: &CleanedInput, state: &AccumulatedState) -> Result<StatePatch, CleanError> {
        self.behavior
            .project(cleaned, state)
            .ok_or_else(|| CleanError::State(format!("cleaned input does not belong to step {}", self.key)))
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Outcome of step resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// The next step to present.
    Step {
        /// Step key.
        step: StepKey,
    },
    /// No step remains and a result is settled.
    Terminal {
        /// Settled result.
        result: ResultKind,
    },
}

/// Catalog validation and resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The catalog has no steps.
    #[error("step catalog is empty")]
    Empty,
    /// A step key appears twice.
    #[error("duplicate step in catalog: {0}")]
    DuplicateStep(StepKey),
    /// The first step is not unconditionally applicable.
    #[error("first catalog step {0} must always apply")]
    FirstStepConditional(StepKey),
    /// No step applies to every unsettled state.
    #[error("step catalog has no catch-all step")]
    MissingCatchAll,
    /// A step after the catch-all requires an unsettled result and can never run.
    #[error("step {step} is unreachable after catch-all {catch_all}")]
    UnreachableStep {
        /// Unreachable step.
        step: StepKey,
        /// Catch-all step shadowing it.
        catch_all: StepKey,
    },
    /// No step applies and no result is settled.
    #[error("no applicable step and no settled result after {completed} answered steps")]
    Unresolvable {
        /// Number of answered steps.
        completed: usize,
    },
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Ordered step catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCatalog {
    /// Steps in resolution order.
    steps: Vec<StepDefinition>,
}

impl StepCatalog {
    /// Builds and validates a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog is structurally invalid.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, CatalogError> {
        let catalog = Self {
            steps,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Returns the obligee-action catalog.
    #[must_use]
    pub fn obligee_action() -> Self {
        Self {
            steps: obligee_action_steps(),
        }
    }

    /// Checks structural invariants of the catalog.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`CatalogError`].
    pub fn validate(&self) -> Result<(), CatalogError> {
        let first = self.steps.first().ok_or(CatalogError::Empty)?;
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.key) {
                return Err(CatalogError::DuplicateStep(step.key));
            }
        }
        if !first.applicability.is_always() {
            return Err(CatalogError::FirstStepConditional(first.key));
        }
        let catch_all = self
            .steps
            .iter()
            .position(|step| is_catch_all(&step.applicability))
            .ok_or(CatalogError::MissingCatchAll)?;
        for step in &self.steps[catch_all + 1 ..] {
            let mut requires_open = false;
            step.applicability.for_each_predicate(&mut |predicate| {
                requires_open |= *predicate == StatePredicate::ResultAbsent;
            });
            if requires_open {
                return Err(CatalogError::UnreachableStep {
                    step: step.key,
                    catch_all: self.steps[catch_all].key,
                });
            }
        }
        Ok(())
    }

    /// Returns the steps in order.
    #[must_use]
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Returns a step definition by key.
    #[must_use]
    pub fn get(&self, key: StepKey) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.key == key)
    }

    /// Returns the first applicable step not yet answered.
    #[must_use]
    pub fn next_step(&self, state: &AccumulatedState, completed: &[StepKey]) -> Option<StepKey> {
        self.steps
            .iter()
            .find(|step| !completed.contains(&step.key) && step.applicable(state))
            .map(|step| step.key)
    }

    /// Resolves the current step or terminal result.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unresolvable`] when nothing applies and no
    /// result is settled.
    pub fn resolve(&self, state: &AccumulatedState, completed: &[StepKey]) -> Result<Resolution, CatalogError> {
        if let Some(step) = self.next_step(state, completed) {
            return Ok(Resolution::Step {
                step,
            });
        }
        state
            .result()
            .map(|result| Resolution::Terminal {
                result,
            })
            .ok_or(CatalogError::Unresolvable {
                completed: completed.len(),
            })
    }

    /// Returns true when a result is settled and no step remains.
    #[must_use]
    pub fn is_terminal(&self, state: &AccumulatedState, completed: &[StepKey]) -> bool {
        state.result().is_some() && self.next_step(state, completed).is_none()
    }
}

/// Returns true when the requirement is exactly "no result settled".
fn is_catch_all(requirement: &Applicability) -> bool {
    match requirement {
        Requirement::Predicate(StatePredicate::ResultAbsent) => true,
        Requirement::And(children) => {
            !children.is_empty() && children.iter().all(|child| is_catch_all(child))
        }
        _ => false,
    }
}

// ============================================================================
// SECTION: Obligee Action Catalog
// ============================================================================

/// Leaf helper.
fn leaf(predicate: StatePredicate) -> Applicability {
    Requirement::predicate(predicate)
}

/// No result settled.
fn open() -> Applicability {
    leaf(StatePredicate::ResultAbsent)
}

/// Branch accepts the action.
fn can(action: ActionType) -> Applicability {
    leaf(StatePredicate::BranchCan {
        action,
    })
}

/// The reply was not marked off topic.
fn on_topic() -> Applicability {
    leaf(StatePredicate::FlagOr {
        key: StateKey::IsOnTopic,
        default: true,
    })
}

/// The reply was not marked as something other than an appeal decision.
fn appeal_decision() -> Applicability {
    leaf(StatePredicate::FlagOr {
        key: StateKey::IsAppealDecision,
        default: true,
    })
}

/// Manual entry.
fn manual() -> Applicability {
    leaf(StatePredicate::SourceIs {
        source: SourceKind::Manual,
    })
}

/// Settled result kind.
fn result_is(result: ResultKind) -> Applicability {
    leaf(StatePredicate::ResultIs {
        result,
    })
}

/// Settled action type.
fn action_is(action: ActionType) -> Applicability {
    leaf(StatePredicate::ActionIs {
        action,
    })
}

/// Appeal-decision steps: manual, open, remandable, still an appeal decision.
fn appeal_step() -> Applicability {
    Requirement::and(vec![manual(), open(), can(ActionType::Remandment), appeal_decision()])
}

/// Builds a definition.
fn define(key: StepKey, applicability: Applicability, behavior: StepBehavior) -> StepDefinition {
    StepDefinition {
        key,
        applicability,
        behavior,
    }
}

/// The obligee-action steps in resolution order.
fn obligee_action_steps() -> Vec<StepDefinition> {
    vec![
        define(StepKey::Basics, Requirement::and(Vec::new()), StepBehavior::Basics),
        define(
            StepKey::IsQuestion,
            Requirement::and(vec![open(), can(ActionType::ClarificationRequest)]),
            StepBehavior::YesNo {
                field: "is_question",
                signal: StateKey::IsQuestion,
                on_yes: Some(ActionType::ClarificationRequest),
            },
        ),
        define(
            StepKey::IsConfirmation,
            Requirement::and(vec![open(), can(ActionType::Confirmation)]),
            StepBehavior::YesNo {
                field: "is_confirmation",
                signal: StateKey::IsConfirmation,
                on_yes: Some(ActionType::Confirmation),
            },
        ),
        define(
            StepKey::IsOnTopic,
            Requirement::and(vec![open(), can(ActionType::Refusal)]),
            StepBehavior::YesNo {
                field: "is_on_topic",
                signal: StateKey::IsOnTopic,
                on_yes: None,
            },
        ),
        define(
            StepKey::ContainsInfo,
            Requirement::and(vec![open(), can(ActionType::Refusal), on_topic()]),
            StepBehavior::Disclosure {
                field: "contains_info",
                on_full: Some(ActionType::Disclosure),
            },
        ),
        define(
            StepKey::IsDecision,
            Requirement::and(vec![open(), can(ActionType::Refusal), on_topic()]),
            StepBehavior::YesNo {
                field: "is_decision",
                signal: StateKey::IsDecision,
                on_yes: Some(ActionType::Refusal),
            },
        ),
        define(
            StepKey::RefusalReasons,
            Requirement::and(vec![result_is(ResultKind::Action), action_is(ActionType::Refusal)]),
            StepBehavior::Reasons {
                settles: None,
            },
        ),
        define(
            StepKey::IsAdvancement,
            Requirement::and(vec![open(), can(ActionType::Advancement), on_topic()]),
            StepBehavior::Advancement,
        ),
        define(
            StepKey::IsExtension,
            Requirement::and(vec![open(), can(ActionType::Extension), on_topic()]),
            StepBehavior::Extension,
        ),
        define(
            StepKey::DisclosureReasons,
            Requirement::and(vec![open(), can(ActionType::Disclosure), on_topic()]),
            StepBehavior::Reasons {
                settles: Some(ActionType::Disclosure),
            },
        ),
        define(
            StepKey::IsAppealDecision,
            Requirement::and(vec![manual(), open(), can(ActionType::Remandment)]),
            StepBehavior::YesNo {
                field: "is_appeal_decision",
                signal: StateKey::IsAppealDecision,
                on_yes: None,
            },
        ),
        define(
            StepKey::ContainsAppealInfo,
            appeal_step(),
            StepBehavior::Disclosure {
                field: "contains_appeal_info",
                on_full: None,
            },
        ),
        define(StepKey::WasAccepted, appeal_step(), StepBehavior::WasAccepted),
        define(StepKey::WasReturned, appeal_step(), StepBehavior::WasReturned),
        define(
            StepKey::ReversionReasons,
            Requirement::and(vec![
                result_is(ResultKind::Action),
                action_is(ActionType::Reversion),
                leaf(StatePredicate::DisclosureIs {
                    level: DisclosureLevel::Partial,
                }),
            ]),
            StepBehavior::Reasons {
                settles: None,
            },
        ),
        define(
            StepKey::InvalidReversion,
            Requirement::and(vec![
                manual(),
                result_is(ResultKind::Help),
                can(ActionType::Remandment),
                appeal_decision(),
            ]),
            StepBehavior::InvalidReversion,
        ),
        define(StepKey::NotCategorized, open(), StepBehavior::NotCategorized),
        define(StepKey::Categorized, result_is(ResultKind::Action), StepBehavior::Categorized),
    ]
}

// ============================================================================
// SECTION: Tests
// ============================================================================
