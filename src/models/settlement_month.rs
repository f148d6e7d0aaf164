//! Settlement month model.
//!
//! A [`SettlementMonth`] is the `YYYY-MM` period a settlement run computes
//! allowances for.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calculation::days_in_month;
use crate::error::{EngineError, EngineResult};

/// A calendar month identified by year and month number.
///
/// Ordering is chronological. Serializes as `"YYYY-MM"`.
///
/// # Example
///
/// ```
/// use allowance_engine::models::SettlementMonth;
///
/// let month: SettlementMonth = "2024-09".parse().unwrap();
/// assert_eq!(month.to_string(), "2024-09");
/// assert_eq!(month.last_day().to_string(), "2024-09-30");
/// assert_eq!(month.next().to_string(), "2024-10");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SettlementMonth {
    year: i32,
    month: u32,
}

impl SettlementMonth {
    /// Creates a month, rejecting month numbers outside 1..=12.
    pub fn new(year: i32, month: u32) -> EngineResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::InvalidDate {
                value: format!("{:04}-{:02}", year, month),
                message: "month must be between 1 and 12".to_string(),
            });
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(EngineError::InvalidDate {
                value: format!("{:04}-{:02}", year, month),
                message: "year is out of range".to_string(),
            });
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The calendar year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// The month number, 1-based.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The first calendar day of the month.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// The last calendar day of the month.
    pub fn last_day(&self) -> NaiveDate {
        let days = days_in_month(self.year, self.month).unwrap_or(28);
        NaiveDate::from_ymd_opt(self.year, self.month, days).unwrap_or(NaiveDate::MIN)
    }

    /// Number of days in the month.
    pub fn days(&self) -> u32 {
        days_in_month(self.year, self.month).unwrap_or(28)
    }

    /// The following month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Returns true if `date` falls within this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for SettlementMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for SettlementMonth {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| EngineError::InvalidDate {
            value: s.to_string(),
            message: message.to_string(),
        };

        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| invalid("expected YYYY-MM"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid("expected YYYY-MM"));
        }
        let year: i32 = year.parse().map_err(|_| invalid("year is not a number"))?;
        let month: u32 = month.parse().map_err(|_| invalid("month is not a number"))?;

        Self::new(year, month).map_err(|_| invalid("month must be between 1 and 12"))
    }
}

impl TryFrom<String> for SettlementMonth {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SettlementMonth> for String {
    fn from(month: SettlementMonth) -> Self {
        month.to_string()
    }
}
