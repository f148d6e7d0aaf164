//! Annual study allowance calculation.
//!
//! The study allowance is a fixed USD amount paid once per academic year in
//! the October settlement run, to every student still in study on 1 October.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::config::ConfigurationSnapshot;
use crate::error::{EngineError, EngineResult};
use crate::models::{AllowanceLine, AllowanceType, AuditStep, SettlementMonth, Student};

use super::calendar::{is_october, STUDY_ALLOWANCE_MONTH};
use super::currency::convert;

/// Rule id recorded when no study allowance is issued.
pub const STUDY_ALLOWANCE_RULE: &str = "study_allowance";
/// Student in study on 1 October.
pub const RULE_STUDY_OCTOBER_IN_STUDY: &str = "study_october_in_study";
/// Student who first entered during October itself.
pub const RULE_STUDY_ENTRY_MONTH: &str = "study_entry_month";
/// Student who left before the first October, paid by policy override.
pub const RULE_STUDY_ENTRY_YEAR_OVERRIDE: &str = "study_entry_year_override";

/// The result of evaluating the study allowance rule for one student and month.
#[derive(Debug, Clone)]
pub struct StudyAllowanceResult {
    /// The proposed line, if the student qualifies this month.
    pub line: Option<AllowanceLine>,
    /// The audit step recording this evaluation.
    pub audit_step: AuditStep,
}

/// Calculates the study allowance owed to a student for one settlement month.
///
/// Only October runs can issue a study allowance. The issued line covers the
/// single day 1 October of the settlement year, so each academic year has
/// exactly one payable period per student.
///
/// # Eligibility
///
/// - Entered on or before 1 October and not exited before it: `study_october_in_study`
/// - Entered later in October, with `issue_study_if_entry_in_october`: `study_entry_month`
/// - Exited before 1 October of the entry year, with
///   `policy_issue_study_if_exit_before_oct_entry_year`: `study_entry_year_override`
///
/// # Errors
///
/// Returns `InvalidDate` if the settlement month cannot be resolved to a calendar date.
pub fn calculate_study_allowance(
    student: &Student,
    config: &ConfigurationSnapshot,
    settlement_month: SettlementMonth,
    step_number: u32,
) -> EngineResult<StudyAllowanceResult> {
    let year = settlement_month.year();
    let input = serde_json::json!({
        "settlement_month": settlement_month.to_string(),
        "first_entry_date": student.first_entry_date.to_string(),
        "status": student.status.to_string(),
        "exit_date": student.exit_date().map(|d| d.to_string())
    });

    if !is_october(year, settlement_month.month())? {
        return Ok(not_issued(
            student,
            step_number,
            input,
            "Study allowance is only issued in October".to_string(),
        ));
    }

    let october_first =
        NaiveDate::from_ymd_opt(year, STUDY_ALLOWANCE_MONTH, 1).ok_or_else(|| {
            EngineError::InvalidDate {
                value: settlement_month.to_string(),
                message: "cannot resolve 1 October".to_string(),
            }
        })?;
    let values = config.values();
    let entry = student.first_entry_date;

    let mut metadata = BTreeMap::new();
    metadata.insert("academic_year".to_string(), year.to_string());
    metadata.insert(
        "fixed_amount_usd".to_string(),
        config.study_allowance_usd().to_string(),
    );
    metadata.insert(
        "rounding_policy".to_string(),
        config.rounding_policy().as_str().to_string(),
    );

    let (rule_id, description, reasoning) = if entry > october_first {
        let entered_this_october = SettlementMonth::of(entry) == settlement_month;
        if !(entered_this_october && values.issue_study_if_entry_in_october) {
            return Ok(not_issued(
                student,
                step_number,
                input,
                format!("First entry {} is after 1 October {}", entry, year),
            ));
        }
        metadata.insert("entry_date".to_string(), entry.to_string());
        (
            RULE_STUDY_ENTRY_MONTH,
            "Study allowance for October entrant",
            format!("Entered {} during October; October entrants are eligible", entry),
        )
    } else {
        match student.exit_date() {
            Some(exit) if exit < october_first => {
                let entry_year_exit = year == entry.year();
                if !(entry_year_exit && values.policy_issue_study_if_exit_before_oct_entry_year) {
                    return Ok(not_issued(
                        student,
                        step_number,
                        input,
                        format!("Exited {} before 1 October {}", exit, year),
                    ));
                }
                metadata.insert("exit_date".to_string(), exit.to_string());
                metadata.insert(
                    "policy_issue_study_if_exit_before_oct_entry_year".to_string(),
                    "true".to_string(),
                );
                (
                    RULE_STUDY_ENTRY_YEAR_OVERRIDE,
                    "Study allowance for entry year (early exit policy)",
                    format!(
                        "Exited {} before the first October; paid under entry-year policy",
                        exit
                    ),
                )
            }
            _ => (
                RULE_STUDY_OCTOBER_IN_STUDY,
                "Annual study allowance",
                format!("In study on 1 October {}", year),
            ),
        }
    };

    let converted = convert(config.study_allowance_usd(), false, config);

    let audit_step = AuditStep {
        step_number,
        student_id: student.student_id.clone(),
        rule_id: rule_id.to_string(),
        rule_name: "Study Allowance".to_string(),
        input,
        output: serde_json::json!({
            "eligible": true,
            "amount_usd": converted.amount_usd.to_string(),
            "fx_rate": converted.fx_rate.to_string(),
            "amount_cny": converted.amount_cny.to_string()
        }),
        reasoning,
    };

    let line = AllowanceLine {
        student_id: student.student_id.clone(),
        allowance_type: AllowanceType::Study,
        period_start: october_first,
        period_end: october_first,
        amount_usd: converted.amount_usd,
        fx_rate: converted.fx_rate,
        amount_cny: converted.amount_cny,
        rule_id: rule_id.to_string(),
        description: description.to_string(),
        metadata,
    };

    Ok(StudyAllowanceResult {
        line: Some(line),
        audit_step,
    })
}

fn not_issued(
    student: &Student,
    step_number: u32,
    input: serde_json::Value,
    reasoning: String,
) -> StudyAllowanceResult {
    StudyAllowanceResult {
        line: None,
        audit_step: AuditStep {
            step_number,
            student_id: student.student_id.clone(),
            rule_id: STUDY_ALLOWANCE_RULE.to_string(),
            rule_name: "Study Allowance".to_string(),
            input,
            output: serde_json::json!({
                "eligible": false,
                "amount_usd": "0"
            }),
            reasoning,
        },
    }
}
