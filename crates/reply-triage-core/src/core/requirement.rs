// crates/reply-triage-core/src/core/requirement.rs
// ============================================================================
// Module: Applicability Requirements
// Description: Boolean algebra over typed step predicates.
// Purpose: Express step applicability as data that can be evaluated and inspected.
// Dependencies: serde, smallvec
// ============================================================================

//! ## Overview
//! A [`Requirement`] is a small Boolean tree whose leaves are domain
//! predicates. Logical operators are generic; the predicate type decides what
//! a leaf means by implementing [`PredicateEval`]. Evaluation short-circuits
//! and never has side effects, which keeps step resolution idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;

// ============================================================================
// SECTION: Predicate Evaluation
// ============================================================================

/// Evaluates a domain predicate against a subject.
pub trait PredicateEval {
    /// Value the predicate reads.
    type Subject: ?Sized;

    /// Returns true when the predicate holds for the subject.
    fn eval(&self, subject: &Self::Subject) -> bool;
}

// ============================================================================
// SECTION: Requirement Definition
// ============================================================================

/// Requirement tree with domain-specific leaves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement<P> {
    /// All sub-requirements must hold. Empty And is satisfied.
    And(SmallVec<[Box<Self>; 4]>),
    /// At least one sub-requirement must hold. Empty Or is unsatisfiable.
    Or(SmallVec<[Box<Self>; 4]>),
    /// Inverts the sub-requirement.
    Not(Box<Self>),
    /// Domain predicate leaf.
    Predicate(P),
}

impl<P> Requirement<P> {
    /// Creates an And requirement.
    #[must_use]
    pub fn and(requirements: Vec<Self>) -> Self {
        Self::And(requirements.into_iter().map(Box::new).collect())
    }

    /// Creates an Or requirement.
    #[must_use]
    pub fn or(requirements: Vec<Self>) -> Self {
        Self::Or(requirements.into_iter().map(Box::new).collect())
    }

    /// Negates a requirement.
    #[must_use]
    pub fn negate(requirement: Self) -> Self {
        Self::Not(Box::new(requirement))
    }

    /// Creates a predicate leaf.
    #[must_use]
    pub const fn predicate(predicate: P) -> Self {
        Self::Predicate(predicate)
    }

    /// Returns true when the requirement is an empty And.
    #[must_use]
    pub fn is_always(&self) -> bool {
        matches!(self, Self::And(reqs) if reqs.is_empty())
    }

    /// Visits every predicate leaf in depth-first order.
    pub fn for_each_predicate<'a>(&'a self, visit: &mut impl FnMut(&'a P)) {
        match self {
            Self::Predicate(predicate) => visit(predicate),
            Self::Not(inner) => inner.for_each_predicate(visit),
            Self::And(reqs) | Self::Or(reqs) => {
                for req in reqs {
                    req.for_each_predicate(visit);
                }
            }
        }
    }
}

impl<P: PredicateEval> Requirement<P> {
    /// Evaluates the requirement with short-circuiting.
    pub fn eval(&self, subject: &P::Subject) -> bool {
        match self {
            Self::Predicate(predicate) => predicate.eval(subject),
            Self::Not(inner) => !inner.eval(subject),
            Self::And(reqs) => reqs.iter().all(|req| req.eval(subject)),
            Self::Or(reqs) => reqs.iter().any(|req| req.eval(subject)),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
