//! Monthly living allowance calculation.
//!
//! The living allowance is paid for every month from the calendar month of
//! first entry through the month the student leaves. Only the entry month is
//! prorated, by calendar days; the exit month is always paid in full.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::config::ConfigurationSnapshot;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AllowanceLine, AllowanceType, AuditStep, AuditWarning, SettlementMonth, Student,
    StudentStatus,
};

use super::calendar::{days_from_date_to_month_end, days_in_month};
use super::currency::convert;

/// Rule id recorded when no living allowance is issued.
pub const LIVING_ALLOWANCE_RULE: &str = "living_allowance";
/// Prorated entry month.
pub const RULE_LIVING_ENTRY_PRORATE: &str = "living_entry_prorate";
/// Full month inside the issuance window.
pub const RULE_LIVING_FULL_MONTH: &str = "living_full_month";
/// Full withdrawal month, paid by policy default or selection.
pub const RULE_LIVING_WITHDRAWAL_MONTH: &str = "living_withdrawal_month";
/// Withdrawal month that is also the entry month.
pub const RULE_LIVING_WITHDRAWAL_PRORATE: &str = "living_withdrawal_prorate";

/// The result of evaluating the living allowance rule for one student and month.
#[derive(Debug, Clone)]
pub struct LivingAllowanceResult {
    /// The proposed line, if the month falls inside the issuance window.
    pub line: Option<AllowanceLine>,
    /// The audit step recording this evaluation.
    pub audit_step: AuditStep,
    /// Set when a withdrawal-month selection did not apply to this student.
    pub warning: Option<AuditWarning>,
}

/// Calculates the living allowance owed to a student for one settlement month.
///
/// # Arguments
///
/// * `student` - The student to evaluate
/// * `config` - The configuration snapshot supplying the monthly rate and FX rate
/// * `settlement_month` - The month being settled
/// * `withdrawal_selected` - Whether the student was selected for withdrawal-month living
/// * `step_number` - The step number for audit trail sequencing
///
/// # Issuance Window
///
/// - InStudy: entry month through the settlement month
/// - Graduated: entry month through the graduation month, inclusive
/// - Withdrawn: entry month through the month before withdrawal; the withdrawal
///   month itself only when `withdrawn_living_default` is set or the student is selected
///
/// # Examples
///
/// ```
/// use allowance_engine::calculation::calculate_living_allowance;
/// use allowance_engine::config::{ConfigValues, ConfigurationSnapshot, LivingAllowanceRates, RoundingPolicy};
/// use allowance_engine::models::{DegreeLevel, SettlementMonth, Student, StudentStatus};
/// use chrono::NaiveDate;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let config = ConfigurationSnapshot::new(1, ConfigValues {
///     living_allowance_usd: LivingAllowanceRates {
///         bachelor: Decimal::from(500),
///         master: Decimal::from(500),
///         phd: Decimal::from(500),
///     },
///     study_allowance_usd: Decimal::from(1000),
///     baggage_allowance_usd: Decimal::from(1500),
///     fx_rate_usd_to_cny: Decimal::from_str("7.20").unwrap(),
///     policy_issue_study_if_exit_before_oct_entry_year: false,
///     withdrawn_living_default: false,
///     issue_study_if_entry_in_october: false,
///     rounding_policy: RoundingPolicy::FinalOnly,
/// }).unwrap();
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
///
/// let month = SettlementMonth::new(2024, 9).unwrap();
/// let result = calculate_living_allowance(&student, &config, month, false, 1).unwrap();
/// let line = result.line.unwrap();
/// assert_eq!(line.amount_usd, Decimal::from(350));
/// assert_eq!(line.amount_cny, Decimal::from_str("2520.00").unwrap());
/// ```
pub fn calculate_living_allowance(
    student: &Student,
    config: &ConfigurationSnapshot,
    settlement_month: SettlementMonth,
    withdrawal_selected: bool,
    step_number: u32,
) -> EngineResult<LivingAllowanceResult> {
    let entry_month = SettlementMonth::of(student.first_entry_date);
    let withdrawal_default = config.values().withdrawn_living_default;

    let withdrawal_month = match student.status {
        StudentStatus::Withdrawn => {
            let date = student.withdrawal_date.ok_or_else(|| {
                EngineError::invalid_student(
                    student.student_id.clone(),
                    "withdrawal_date",
                    "is required when status is Withdrawn",
                )
            })?;
            Some(SettlementMonth::of(date))
        }
        _ => None,
    };
    let is_withdrawal_month = withdrawal_month == Some(settlement_month);

    let warning = if withdrawal_selected && !is_withdrawal_month {
        Some(AuditWarning::for_student(
            "withdrawal_selection_not_applicable",
            student.student_id.clone(),
            format!(
                "Selected for withdrawal-month living allowance, but {} is not the withdrawal month",
                settlement_month
            ),
            "low",
        ))
    } else {
        None
    };

    let not_issued_reason = if settlement_month < entry_month {
        Some(format!("Settlement month precedes entry month {}", entry_month))
    } else {
        match student.status {
            StudentStatus::InStudy => None,
            StudentStatus::Graduated => {
                let graduation_date = student.graduation_date.ok_or_else(|| {
                    EngineError::invalid_student(
                        student.student_id.clone(),
                        "graduation_date",
                        "is required when status is Graduated",
                    )
                })?;
                let graduation_month = SettlementMonth::of(graduation_date);
                (settlement_month > graduation_month)
                    .then(|| format!("Settlement month is after graduation month {}", graduation_month))
            }
            StudentStatus::Withdrawn => match withdrawal_month {
                Some(month) if settlement_month > month => {
                    Some(format!("Settlement month is after withdrawal month {}", month))
                }
                Some(month) if settlement_month == month && !(withdrawal_default || withdrawal_selected) => {
                    Some("Withdrawal month is not covered by policy default or selection".to_string())
                }
                _ => None,
            },
        }
    };

    if let Some(reason) = not_issued_reason {
        let audit_step = AuditStep {
            step_number,
            student_id: student.student_id.clone(),
            rule_id: LIVING_ALLOWANCE_RULE.to_string(),
            rule_name: "Living Allowance".to_string(),
            input: serde_json::json!({
                "settlement_month": settlement_month.to_string(),
                "entry_month": entry_month.to_string(),
                "status": student.status.to_string(),
                "withdrawal_selected": withdrawal_selected
            }),
            output: serde_json::json!({
                "eligible": false,
                "amount_usd": "0"
            }),
            reasoning: reason,
        };

        return Ok(LivingAllowanceResult {
            line: None,
            audit_step,
            warning,
        });
    }

    let monthly_usd = config.living_rate(student.degree_level);
    let is_entry_month = settlement_month == entry_month;

    let mut metadata = BTreeMap::new();
    metadata.insert("monthly_usd".to_string(), monthly_usd.to_string());
    metadata.insert(
        "rounding_policy".to_string(),
        config.rounding_policy().as_str().to_string(),
    );

    let (amount_usd, reasoning) = if is_entry_month {
        let days_counted = days_from_date_to_month_end(student.first_entry_date)?;
        let total_days = days_in_month(settlement_month.year(), settlement_month.month())?;
        let amount = monthly_usd * Decimal::from(days_counted) / Decimal::from(total_days);

        metadata.insert("basis".to_string(), "prorated".to_string());
        metadata.insert(
            "entry_date".to_string(),
            student.first_entry_date.to_string(),
        );
        metadata.insert("days_counted".to_string(), days_counted.to_string());
        metadata.insert("days_in_month".to_string(), total_days.to_string());
        metadata.insert(
            "fraction".to_string(),
            format!("{}/{}", days_counted, total_days),
        );

        let reasoning = format!(
            "Entry month: ${} × {}/{} days = ${}",
            monthly_usd.normalize(),
            days_counted,
            total_days,
            amount.normalize()
        );
        (amount, reasoning)
    } else {
        metadata.insert("basis".to_string(), "full_month".to_string());
        let reasoning = format!("Full month inside issuance window: ${}", monthly_usd.normalize());
        (monthly_usd, reasoning)
    };

    if is_withdrawal_month {
        if let Some(date) = student.withdrawal_date {
            metadata.insert("withdrawal_date".to_string(), date.to_string());
        }
        let basis = if withdrawal_selected { "selection" } else { "policy_default" };
        metadata.insert("withdrawal_basis".to_string(), basis.to_string());
    }

    let (rule_id, description) = match (is_withdrawal_month, is_entry_month) {
        (true, true) => (
            RULE_LIVING_WITHDRAWAL_PRORATE,
            "Prorated living allowance for withdrawal month",
        ),
        (true, false) => (
            RULE_LIVING_WITHDRAWAL_MONTH,
            "Living allowance for withdrawal month",
        ),
        (false, true) => (
            RULE_LIVING_ENTRY_PRORATE,
            "Prorated living allowance for entry month",
        ),
        (false, false) => (RULE_LIVING_FULL_MONTH, "Full monthly living allowance"),
    };

    let converted = convert(amount_usd, is_entry_month, config);

    let audit_step = AuditStep {
        step_number,
        student_id: student.student_id.clone(),
        rule_id: rule_id.to_string(),
        rule_name: "Living Allowance".to_string(),
        input: serde_json::json!({
            "settlement_month": settlement_month.to_string(),
            "entry_month": entry_month.to_string(),
            "degree_level": student.degree_level.to_string(),
            "status": student.status.to_string(),
            "monthly_usd": monthly_usd.to_string(),
            "withdrawal_selected": withdrawal_selected
        }),
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
        allowance_type: AllowanceType::Living,
        period_start: settlement_month.first_day(),
        period_end: settlement_month.last_day(),
        amount_usd: converted.amount_usd,
        fx_rate: converted.fx_rate,
        amount_cny: converted.amount_cny,
        rule_id: rule_id.to_string(),
        description: description.to_string(),
        metadata,
    };

    Ok(LivingAllowanceResult {
        line: Some(line),
        audit_step,
        warning,
    })
}
