//! Date-scoped habit logic: which habits apply on a day, what a completion
//! submission changes, and how far along each habit is.
//!
//! Everything here is pure. Callers supply habits and completion dates from
//! the store and persist whatever comes back.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::models::Habit;

/// End date given to habits created without one.
pub static OPEN_ENDED: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(9999, 1, 1).unwrap_or(NaiveDate::MAX));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("'{0}' is not a date in YYYY-MM-DD format")]
    MalformedDate(String),

    #[error("Habit label must not be empty")]
    EmptyLabel,

    #[error("Start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// Parses a `YYYY-MM-DD` date. Single-digit months or days, signs and
/// surrounding whitespace are all rejected.
pub fn parse_date(input: &str) -> Result<NaiveDate, InputError> {
    let bytes = input.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });

    if !well_formed {
        return Err(InputError::MalformedDate(input.to_string()));
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| InputError::MalformedDate(input.to_string()))
}

pub fn validate_label(label: &str) -> Result<&str, InputError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(InputError::EmptyLabel);
    }
    Ok(trimmed)
}

pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), InputError> {
    if start > end {
        return Err(InputError::InvertedRange { start, end });
    }
    Ok(())
}

/// Habits whose inclusive date range contains `day`, in input order.
pub fn eligible_habits(habits: &[Habit], day: NaiveDate) -> Vec<&Habit> {
    habits.iter().filter(|h| h.is_eligible_on(day)).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub to_insert: BTreeSet<i64>,
    pub to_delete: BTreeSet<i64>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_delete.is_empty()
    }
}

/// Diffs the checked habits of a submission against the completions already
/// recorded for the same day.
pub fn reconcile(submitted: &BTreeSet<i64>, previous: &BTreeSet<i64>) -> Reconciliation {
    Reconciliation {
        to_insert: submitted.difference(previous).copied().collect(),
        to_delete: previous.difference(submitted).copied().collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionStats {
    pub total_days: i64,
    pub completed_days: i64,
    pub percent: i64,
}

/// Progress of `habit` as of `today`.
///
/// `total_days` counts both the start day and today. A habit that has not
/// started yet reports zero days and zero percent. The percentage truncates.
pub fn completion_stats(
    habit: &Habit,
    completions: &[NaiveDate],
    today: NaiveDate,
) -> CompletionStats {
    let completed_days = completions.iter().filter(|d| **d <= today).count() as i64;

    let total_days = (today - habit.start_date).num_days() + 1;
    if total_days <= 0 {
        return CompletionStats {
            total_days: 0,
            completed_days,
            percent: 0,
        };
    }

    let percent = (completed_days * 100 / total_days).min(100);

    CompletionStats {
        total_days,
        completed_days,
        percent,
    }
}
