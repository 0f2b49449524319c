// crates/reply-triage-core/src/core/dates.rs
// ============================================================================
// Module: Calendar Date Rules
// Description: Month arithmetic and the shared reply date window.
// Purpose: Validate delivery and legal dates against today and prior actions.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Dates are local calendar days supplied by the host; nothing here reads the
//! clock. The reply date window is shared by Basics (`delivered_date`) and
//! Categorized (`legal_date`): a date may not precede the branch's previous
//! legal date, may not be after today, and may not be older than the
//! staleness bound (today minus N calendar months, clamped to month end).

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::Date;
use time::Month;

use crate::core::form::ErrorCode;

// ============================================================================
// SECTION: Month Arithmetic
// ============================================================================

/// Returns `date` moved back by `months` calendar months.
///
/// The day is clamped to the last day of the target month, so 31 March minus
/// one month is the last day of February. Returns `None` when the result
/// falls outside the supported calendar range.
#[must_use]
pub fn months_before(date: Date, months: u32) -> Option<Date> {
    let month_index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1;
    let target = month_index - i64::from(months);
    let year = i32::try_from(target.div_euclid(12)).ok()?;
    let month_number = u8::try_from(target.rem_euclid(12) + 1).ok()?;
    let month = Month::try_from(month_number).ok()?;
    let mut day = date.day();
    while day > 27 {
        if let Ok(clamped) = Date::from_calendar_date(year, month, day) {
            return Some(clamped);
        }
        day -= 1;
    }
    Date::from_calendar_date(year, month, day).ok()
}

/// Parses a date-only `YYYY-MM-DD` value.
#[must_use]
pub fn parse_calendar_date(value: &str) -> Option<Date> {
    let mut parts = value.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

// ============================================================================
// SECTION: Reply Date Window
// ============================================================================

/// Bounds a reply date must fall within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyDateWindow {
    /// Legal date of the branch's previous action.
    pub previous_legal_date: Option<Date>,
    /// Local calendar day of the submission.
    pub today: Date,
    /// Maximum age in calendar months.
    pub staleness_months: u32,
}

impl ReplyDateWindow {
    /// Checks a date against the window, returning the first violated rule.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::OlderThanPrevious`], [`ErrorCode::FromFuture`], or
    /// [`ErrorCode::OlderThanMonth`], checked in that order.
    pub fn check(&self, date: Date) -> Result<(), ErrorCode> {
        if self.previous_legal_date.is_some_and(|previous| date < previous) {
            return Err(ErrorCode::OlderThanPrevious);
        }
        if date > self.today {
            return Err(ErrorCode::FromFuture);
        }
        if months_before(self.today, self.staleness_months).is_some_and(|floor| date < floor) {
            return Err(ErrorCode::OlderThanMonth);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
