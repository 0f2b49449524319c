// crates/reply-triage-core/src/core/form.rs
// ============================================================================
// Module: Step Forms
// Description: Field schemas, raw input coercion, and field-scoped errors.
// Purpose: Turn untrusted JSON input into typed values or stable error codes.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Each step declares its input as a list of [`FieldSpec`]s. Raw input is a
//! JSON object; [`FormReader`] coerces one field at a time and records a
//! stable [`ErrorCode`] per failing field. Empty strings and `null` read as
//! absent, so an optional field left blank is not an error.
//!
//! Security posture: input is untrusted; coercion never panics and oversize
//! text is rejected with [`ErrorCode::TooLong`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::Date;

use crate::core::dates::parse_calendar_date;

// ============================================================================
// SECTION: Raw Input
// ============================================================================

/// Raw step input: a JSON object keyed by field name.
pub type RawInput = serde_json::Map<String, Value>;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable field-level validation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A required value is missing.
    Required,
    /// The value is not one of the offered choices.
    InvalidChoice,
    /// A number is outside its bounds.
    OutOfRange,
    /// The date precedes the branch's previous legal date.
    OlderThanPrevious,
    /// The date is after today.
    FromFuture,
    /// The date is older than the staleness bound.
    OlderThanMonth,
    /// The legal date is after the delivery date.
    NewerThanDeliveredDate,
    /// The backfilled delivery date is after the legal date.
    NewerThanLegalDate,
    /// The backfilled delivery date precedes the last action's legal date.
    OlderThanLastActionLegalDate,
    /// An advancement target equals the branch's own obligee.
    SameObligee,
    /// An advancement target repeats an earlier target.
    DuplicateObligee,
    /// "none" was combined with other reasons.
    NoneContradiction,
    /// No pending obligee has the given name.
    InvalidObligeeName,
    /// The branch id is not part of the thread.
    UnknownBranch,
    /// The value has the wrong type or format, or failed a collaborator check.
    Invalid,
    /// Text exceeds its maximum length.
    TooLong,
}

impl ErrorCode {
    /// Returns the stable code string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::InvalidChoice => "invalid_choice",
            Self::OutOfRange => "out_of_range",
            Self::OlderThanPrevious => "older_than_previous",
            Self::FromFuture => "from_future",
            Self::OlderThanMonth => "older_than_month",
            Self::NewerThanDeliveredDate => "newer_than_delivered_date",
            Self::NewerThanLegalDate => "newer_than_legal_date",
            Self::OlderThanLastActionLegalDate => "older_than_last_action_legal_date",
            Self::SameObligee => "same_obligee",
            Self::DuplicateObligee => "duplicate_obligee",
            Self::NoneContradiction => "none_contradiction",
            Self::InvalidObligeeName => "invalid_obligee_name",
            Self::UnknownBranch => "unknown_branch",
            Self::Invalid => "invalid",
            Self::TooLong => "too_long",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-scoped validation errors returned from a rejected submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    /// Error codes keyed by field name.
    fields: BTreeMap<String, Vec<ErrorCode>>,
}

impl ValidationErrors {
    /// Creates an empty error set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Records an error on a field.
    pub fn add(&mut self, field: &str, code: ErrorCode) {
        self.fields.entry(field.to_string()).or_default().push(code);
    }

    /// Returns true when no field failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true when the field has at least one error.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the codes recorded for a field.
    #[must_use]
    pub fn codes(&self, field: &str) -> &[ErrorCode] {
        self.fields.get(field).map_or(&[], Vec::as_slice)
    }

    /// Iterates fields and their codes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ErrorCode])> {
        self.fields.iter().map(|(name, codes)| (name.as_str(), codes.as_slice()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, codes) in &self.fields {
            for code in codes {
                if !first {
                    f.write_str(", ")?;
                }
                first = false;
                write!(f, "{field}: {code}")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Field Schema
// ============================================================================

/// One offered choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Submitted value.
    pub value: String,
    /// Label key, or a literal label for data-driven choices.
    pub label: String,
}

impl Choice {
    /// Creates a choice.
    #[must_use]
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Input kind of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Yes/no radio answer.
    YesNo,
    /// One of the offered choices.
    Choice {
        /// Offered choices.
        choices: Vec<Choice>,
    },
    /// Any subset of the offered choices.
    MultiChoice {
        /// Offered choices.
        choices: Vec<Choice>,
    },
    /// `YYYY-MM-DD` calendar date.
    Date,
    /// Bounded integer.
    Integer {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Free text.
    Text {
        /// Maximum length in characters.
        max_len: Option<usize>,
        /// Rendered as a text area.
        multiline: bool,
    },
    /// Obligee name resolved through the obligee directory.
    Obligee,
    /// List of staged attachment ids.
    Attachments,
}

/// Declared input field of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name in the raw input.
    pub name: String,
    /// Input kind and constraints.
    pub kind: FieldKind,
    /// Whether the field must be present.
    pub required: bool,
    /// Label key for the surrounding UI.
    pub label_key: String,
    /// Initial value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<Value>,
}

impl FieldSpec {
    /// Creates a field spec with no initial value.
    #[must_use]
    pub fn new(name: &str, kind: FieldKind, required: bool, label_key: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required,
            label_key: label_key.into(),
            initial: None,
        }
    }

    /// Sets the initial value.
    #[must_use]
    pub fn with_initial(mut self, initial: Value) -> Self {
        self.initial = Some(initial);
        self
    }
}

// ============================================================================
// SECTION: Form Reader
// ============================================================================

/// Coerces raw input field by field, collecting errors.
#[derive(Debug)]
pub struct FormReader<'a> {
    /// Raw input being read.
    input: &'a RawInput,
    /// Errors recorded so far.
    errors: ValidationErrors,
}

impl<'a> FormReader<'a> {
    /// Creates a reader over raw input.
    #[must_use]
    pub const fn new(input: &'a RawInput) -> Self {
        Self {
            input,
            errors: ValidationErrors::new(),
        }
    }

    /// Returns the present, non-blank raw value of a field.
    fn raw(&self, name: &str) -> Option<&'a Value> {
        match self.input.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if text.trim().is_empty() => None,
            Some(Value::Array(items)) if items.is_empty() => None,
            Some(value) => Some(value),
        }
    }

    /// Records a missing value when the field is required.
    fn missing<T>(&mut self, name: &str, required: bool) -> Option<T> {
        if required {
            self.errors.add(name, ErrorCode::Required);
        }
        None
    }

    /// Reads a yes/no answer (`true`/`false`, `1`/`0`, `"yes"`/`"no"`).
    pub fn yes_no(&mut self, name: &str, required: bool) -> Option<bool> {
        let Some(value) = self.raw(name) else {
            return self.missing(name, required);
        };
        let parsed = match value {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(text) => match text.trim() {
                "1" | "yes" | "true" => Some(true),
                "0" | "no" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            self.errors.add(name, ErrorCode::InvalidChoice);
        }
        parsed
    }

    /// Reads one of the offered options.
    pub fn choice<T: Copy>(&mut self, name: &str, options: &[(&str, T)], required: bool) -> Option<T> {
        let Some(value) = self.raw(name) else {
            return self.missing(name, required);
        };
        let found = value
            .as_str()
            .map(str::trim)
            .and_then(|text| options.iter().find(|(label, _)| *label == text))
            .map(|(_, option)| *option);
        if found.is_none() {
            self.errors.add(name, ErrorCode::InvalidChoice);
        }
        found
    }

    /// Reads a list of option codes, each of which must be offered.
    pub fn multi_choice(&mut self, name: &str, offered: &[&str], required: bool) -> Option<Vec<String>> {
        let values = self.string_list(name, required)?;
        if values.iter().any(|value| !offered.contains(&value.as_str())) {
            self.errors.add(name, ErrorCode::InvalidChoice);
            return None;
        }
        Some(values)
    }

    /// Reads a list of strings, accepting a single string as a one-item list.
    pub fn string_list(&mut self, name: &str, required: bool) -> Option<Vec<String>> {
        let Some(value) = self.raw(name) else {
            return self.missing(name, required);
        };
        let items = match value {
            Value::String(text) => Some(vec![text.trim().to_string()]),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(|text| text.trim().to_string()))
                .collect::<Option<Vec<_>>>(),
            _ => None,
        };
        if items.is_none() {
            self.errors.add(name, ErrorCode::Invalid);
        }
        items
    }

    /// Reads a `YYYY-MM-DD` calendar date.
    pub fn date(&mut self, name: &str, required: bool) -> Option<Date> {
        let Some(value) = self.raw(name) else {
            return self.missing(name, required);
        };
        let parsed = value.as_str().and_then(|text| parse_calendar_date(text.trim()));
        if parsed.is_none() {
            self.errors.add(name, ErrorCode::Invalid);
        }
        parsed
    }

    /// Reads an integer within inclusive bounds.
    pub fn integer(&mut self, name: &str, min: i64, max: i64, required: bool) -> Option<i64> {
        let Some(value) = self.raw(name) else {
            return self.missing(name, required);
        };
        let parsed = match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(parsed) = parsed else {
            self.errors.add(name, ErrorCode::Invalid);
            return None;
        };
        if parsed < min || parsed > max {
            self.errors.add(name, ErrorCode::OutOfRange);
            return None;
        }
        Some(parsed)
    }

    /// Reads trimmed text, enforcing a maximum length in characters.
    pub fn text(&mut self, name: &str, max_len: Option<usize>, required: bool) -> Option<String> {
        let Some(value) = self.raw(name) else {
            return self.missing(name, required);
        };
        let Some(text) = value.as_str() else {
            self.errors.add(name, ErrorCode::Invalid);
            return None;
        };
        let text = text.trim();
        if max_len.is_some_and(|max| text.chars().count() > max) {
            self.errors.add(name, ErrorCode::TooLong);
            return None;
        }
        Some(text.to_string())
    }

    /// Records an error found by a cross-field check.
    pub fn add_error(&mut self, name: &str, code: ErrorCode) {
        self.errors.add(name, code);
    }

    /// Returns true when the field already failed coercion.
    #[must_use]
    pub fn has_error(&self, name: &str) -> bool {
        self.errors.has(name)
    }

    /// Finishes reading, returning the errors if any field failed.
    ///
    /// # Errors
    ///
    /// Returns the collected [`ValidationErrors`] when any field failed.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() { Ok(()) } else { Err(self.errors) }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
