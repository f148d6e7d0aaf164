//! Calendar arithmetic used by the allowance rules.
//!
//! Pure date helpers with no side effects: days in a month, month iteration,
//! and the October check that gates the study allowance.

use chrono::{Datelike, NaiveDate};

use crate::error::{EngineError, EngineResult};
use crate::models::SettlementMonth;

/// The month in which the annual study allowance is issued.
pub const STUDY_ALLOWANCE_MONTH: u32 = 10;

fn invalid_month(year: i32, month: u32) -> EngineError {
    EngineError::InvalidDate {
        value: format!("{:04}-{:02}", year, month),
        message: "month must be between 1 and 12".to_string(),
    }
}

/// Returns the number of days in a month, accounting for leap years.
///
/// # Errors
///
/// Returns `InvalidDate` if `month` is not in 1..=12 or the year is out of range.
///
/// # Examples
///
/// ```
/// use allowance_engine::calculation::days_in_month;
///
/// assert_eq!(days_in_month(2024, 2).unwrap(), 29);
/// assert_eq!(days_in_month(2023, 2).unwrap(), 28);
/// assert_eq!(days_in_month(2024, 9).unwrap(), 30);
/// assert!(days_in_month(2024, 13).is_err());
/// ```
pub fn days_in_month(year: i32, month: u32) -> EngineResult<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| invalid_month(year, month))?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| invalid_month(year, month))?;

    Ok(next_first.signed_duration_since(first).num_days() as u32)
}

/// Returns every month from `start` to `end`, both inclusive, in order.
///
/// Returns an empty vector when `end` is before `start`.
///
/// # Examples
///
/// ```
/// use allowance_engine::calculation::months_between_inclusive;
/// use allowance_engine::models::SettlementMonth;
///
/// let start = SettlementMonth::new(2024, 11).unwrap();
/// let end = SettlementMonth::new(2025, 2).unwrap();
/// let months: Vec<String> = months_between_inclusive(start, end)
///     .iter()
///     .map(|m| m.to_string())
///     .collect();
/// assert_eq!(months, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
/// ```
pub fn months_between_inclusive(start: SettlementMonth, end: SettlementMonth) -> Vec<SettlementMonth> {
    let mut months = Vec::new();
    let mut current = start;
    while current <= end {
        months.push(current);
        current = current.next();
    }
    months
}

/// Returns true if the given month is October.
///
/// # Errors
///
/// Returns `InvalidDate` for month numbers outside 1..=12.
pub fn is_october(year: i32, month: u32) -> EngineResult<bool> {
    if !(1..=12).contains(&month) {
        return Err(invalid_month(year, month));
    }
    Ok(month == STUDY_ALLOWANCE_MONTH)
}

/// Counts the days from `date` to the end of its month, including `date` itself.
///
/// # Examples
///
/// ```
/// use allowance_engine::calculation::days_from_date_to_month_end;
/// use chrono::NaiveDate;
///
/// let entry = NaiveDate::from_ymd_opt(2024, 9, 10).unwrap();
/// assert_eq!(days_from_date_to_month_end(entry).unwrap(), 21);
/// ```
pub fn days_from_date_to_month_end(date: NaiveDate) -> EngineResult<u32> {
    let total = days_in_month(date.year(), date.month())?;
    Ok(total - date.day() + 1)
}
