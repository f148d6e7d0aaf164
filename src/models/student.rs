//! Student model and related types.
//!
//! This module defines the [`Student`] struct together with the
//! [`DegreeLevel`] and [`StudentStatus`] enums used by the allowance rules.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// The degree stage a student is enrolled in.
///
/// Preparatory students are normalized to their target degree stage before
/// they reach the engine; non-degree students never enter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DegreeLevel {
    /// Undergraduate degree.
    Bachelor,
    /// Master's degree.
    Master,
    /// Doctoral degree.
    #[serde(rename = "PhD")]
    PhD,
}

impl fmt::Display for DegreeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DegreeLevel::Bachelor => "Bachelor",
            DegreeLevel::Master => "Master",
            DegreeLevel::PhD => "PhD",
        };
        f.write_str(label)
    }
}

impl FromStr for DegreeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bachelor" => Ok(DegreeLevel::Bachelor),
            "master" => Ok(DegreeLevel::Master),
            "phd" => Ok(DegreeLevel::PhD),
            other => Err(format!("unknown degree level '{}'", other)),
        }
    }
}

/// The lifecycle status of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudentStatus {
    /// Currently studying.
    InStudy,
    /// Completed the degree; `graduation_date` is set.
    Graduated,
    /// Left before completion; `withdrawal_date` is set.
    Withdrawn,
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StudentStatus::InStudy => "InStudy",
            StudentStatus::Graduated => "Graduated",
            StudentStatus::Withdrawn => "Withdrawn",
        };
        f.write_str(label)
    }
}

impl FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "instudy" => Ok(StudentStatus::InStudy),
            "graduated" => Ok(StudentStatus::Graduated),
            "withdrawn" => Ok(StudentStatus::Withdrawn),
            _ => Err(format!("unknown status '{}'", s.trim())),
        }
    }
}

/// A foreign student evaluated by the allowance rules.
///
/// # Example
///
/// ```
/// use allowance_engine::models::{DegreeLevel, Student, StudentStatus};
/// use chrono::NaiveDate;
///
/// let student = Student {
///     student_id: "S001".to_string(),
///     name: "Aisha".to_string(),
///     degree_level: DegreeLevel::Bachelor,
///     first_entry_date: NaiveDate::from_ymd_opt(2024, 9, 10).unwrap(),
///     status: StudentStatus::InStudy,
///     graduation_date: None,
///     withdrawal_date: None,
/// };
/// assert!(student.validate().is_ok());
/// assert_eq!(student.exit_date(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Globally unique, immutable identifier.
    pub student_id: String,
    /// Display name.
    pub name: String,
    /// The degree stage the student is enrolled in.
    pub degree_level: DegreeLevel,
    /// The date the student first entered the country. Immutable once set.
    pub first_entry_date: NaiveDate,
    /// Lifecycle status.
    pub status: StudentStatus,
    /// Set only when the student has graduated.
    #[serde(default)]
    pub graduation_date: Option<NaiveDate>,
    /// Set only when the student has withdrawn.
    #[serde(default)]
    pub withdrawal_date: Option<NaiveDate>,
}

impl Student {
    /// Checks required fields and the status/date invariants.
    ///
    /// Returns [`EngineError::InvalidStudent`] naming the first offending field.
    pub fn validate(&self) -> EngineResult<()> {
        let fail = |field: &str, message: &str| {
            Err(EngineError::invalid_student(
                self.student_id.clone(),
                field,
                message,
            ))
        };

        if self.student_id.trim().is_empty() {
            return fail("student_id", "is required");
        }
        if self.name.trim().is_empty() {
            return fail("name", "is required");
        }

        match self.status {
            StudentStatus::InStudy => {
                if self.graduation_date.is_some() {
                    return fail("graduation_date", "must be empty while InStudy");
                }
                if self.withdrawal_date.is_some() {
                    return fail("withdrawal_date", "must be empty while InStudy");
                }
            }
            StudentStatus::Graduated => {
                if self.graduation_date.is_none() {
                    return fail("graduation_date", "is required when status is Graduated");
                }
                if self.withdrawal_date.is_some() {
                    return fail("withdrawal_date", "must be empty when status is Graduated");
                }
            }
            StudentStatus::Withdrawn => {
                if self.withdrawal_date.is_none() {
                    return fail("withdrawal_date", "is required when status is Withdrawn");
                }
                if self.graduation_date.is_some() {
                    return fail("graduation_date", "must be empty when status is Withdrawn");
                }
            }
        }

        if let Some(exit) = self.exit_date() {
            if exit < self.first_entry_date {
                let field = match self.status {
                    StudentStatus::Withdrawn => "withdrawal_date",
                    _ => "graduation_date",
                };
                return fail(field, "must be on or after first_entry_date");
            }
        }

        Ok(())
    }

    /// Returns the graduation or withdrawal date, whichever applies.
    pub fn exit_date(&self) -> Option<NaiveDate> {
        match self.status {
            StudentStatus::InStudy => None,
            StudentStatus::Graduated => self.graduation_date,
            StudentStatus::Withdrawn => self.withdrawal_date,
        }
    }
}
