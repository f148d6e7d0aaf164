//! One-time excess baggage allowance calculation.
//!
//! Paid once per student after graduation, only when the student is part of
//! this run's special payment selection.

use std::collections::BTreeMap;

use crate::config::ConfigurationSnapshot;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AllowanceLine, AllowanceType, AuditStep, AuditWarning, SettlementMonth, Student,
    StudentStatus,
};

use super::currency::convert;
use super::history::PaymentHistory;

/// Rule id recorded when no baggage allowance is issued.
pub const BAGGAGE_ALLOWANCE_RULE: &str = "baggage_allowance";
/// Graduated student selected for the one-time payment.
pub const RULE_BAGGAGE_ON_GRADUATION: &str = "baggage_on_graduation";

/// The result of evaluating the baggage allowance rule for one student and month.
#[derive(Debug, Clone)]
pub struct BaggageAllowanceResult {
    /// The proposed line, if the student qualifies.
    pub line: Option<AllowanceLine>,
    /// The audit step recording this evaluation.
    pub audit_step: AuditStep,
    /// Set when a selection could not be honoured.
    pub warning: Option<AuditWarning>,
}

/// Calculates the excess baggage allowance for one student and settlement month.
///
/// # Arguments
///
/// * `student` - The student to evaluate
/// * `config` - The configuration snapshot supplying the fixed amount
/// * `settlement_month` - The month being settled
/// * `history` - Persisted payments, consulted for a prior baggage item
/// * `selected` - Whether the student is in this run's baggage selection
/// * `step_number` - The step number for audit trail sequencing
///
/// # Returns
///
/// A line dated at the graduation date when the student is selected, Graduated
/// no later than the settlement month, and has never been paid baggage before.
/// A selection that cannot be honoured produces a warning instead of a line.
pub fn calculate_baggage_allowance(
    student: &Student,
    config: &ConfigurationSnapshot,
    settlement_month: SettlementMonth,
    history: &impl PaymentHistory,
    selected: bool,
    step_number: u32,
) -> EngineResult<BaggageAllowanceResult> {
    let input = serde_json::json!({
        "settlement_month": settlement_month.to_string(),
        "status": student.status.to_string(),
        "graduation_date": student.graduation_date.map(|d| d.to_string()),
        "selected": selected
    });

    if !selected {
        return Ok(not_issued(
            student,
            step_number,
            input,
            "Not selected for baggage allowance this month".to_string(),
            None,
        ));
    }

    if student.status != StudentStatus::Graduated {
        let warning = AuditWarning::for_student(
            "baggage_not_graduated",
            student.student_id.clone(),
            format!(
                "Selected for baggage allowance but status is {}",
                student.status
            ),
            "medium",
        );
        return Ok(not_issued(
            student,
            step_number,
            input,
            "Student has not graduated".to_string(),
            Some(warning),
        ));
    }

    let graduation_date = student.graduation_date.ok_or_else(|| {
        EngineError::invalid_student(
            student.student_id.clone(),
            "graduation_date",
            "is required when status is Graduated",
        )
    })?;
    let graduation_month = SettlementMonth::of(graduation_date);

    if graduation_month > settlement_month {
        let warning = AuditWarning::for_student(
            "baggage_before_graduation_month",
            student.student_id.clone(),
            format!(
                "Selected for baggage allowance in {} but graduation month is {}",
                settlement_month, graduation_month
            ),
            "medium",
        );
        return Ok(not_issued(
            student,
            step_number,
            input,
            format!("Graduation month {} is after settlement month", graduation_month),
            Some(warning),
        ));
    }

    if history.has_paid(&student.student_id, AllowanceType::ExcessBaggage) {
        let warning = AuditWarning::for_student(
            "duplicate_line_item",
            student.student_id.clone(),
            "Baggage allowance was already paid in a previous run",
            "low",
        );
        return Ok(not_issued(
            student,
            step_number,
            input,
            "Baggage allowance already paid".to_string(),
            Some(warning),
        ));
    }

    let fixed_usd = config.baggage_allowance_usd();
    let converted = convert(fixed_usd, false, config);

    let mut metadata = BTreeMap::new();
    metadata.insert("graduation_date".to_string(), graduation_date.to_string());
    metadata.insert("fixed_amount_usd".to_string(), fixed_usd.to_string());
    metadata.insert("selection".to_string(), "special_payment".to_string());
    metadata.insert(
        "settlement_month".to_string(),
        settlement_month.to_string(),
    );
    metadata.insert(
        "rounding_policy".to_string(),
        config.rounding_policy().as_str().to_string(),
    );

    let audit_step = AuditStep {
        step_number,
        student_id: student.student_id.clone(),
        rule_id: RULE_BAGGAGE_ON_GRADUATION.to_string(),
        rule_name: "Excess Baggage Allowance".to_string(),
        input,
        output: serde_json::json!({
            "eligible": true,
            "amount_usd": converted.amount_usd.to_string(),
            "fx_rate": converted.fx_rate.to_string(),
            "amount_cny": converted.amount_cny.to_string()
        }),
        reasoning: format!(
            "Graduated {} and selected; one-time payment of ${}",
            graduation_date,
            fixed_usd.normalize()
        ),
    };

    let line = AllowanceLine {
        student_id: student.student_id.clone(),
        allowance_type: AllowanceType::ExcessBaggage,
        period_start: graduation_date,
        period_end: graduation_date,
        amount_usd: converted.amount_usd,
        fx_rate: converted.fx_rate,
        amount_cny: converted.amount_cny,
        rule_id: RULE_BAGGAGE_ON_GRADUATION.to_string(),
        description: "One-time excess baggage allowance on graduation".to_string(),
        metadata,
    };

    Ok(BaggageAllowanceResult {
        line: Some(line),
        audit_step,
        warning: None,
    })
}

fn not_issued(
    student: &Student,
    step_number: u32,
    input: serde_json::Value,
    reasoning: String,
    warning: Option<AuditWarning>,
) -> BaggageAllowanceResult {
    BaggageAllowanceResult {
        line: None,
        audit_step: AuditStep {
            step_number,
            student_id: student.student_id.clone(),
            rule_id: BAGGAGE_ALLOWANCE_RULE.to_string(),
            rule_name: "Excess Baggage Allowance".to_string(),
            input,
            output: serde_json::json!({
                "eligible": false,
                "amount_usd": "0"
            }),
            reasoning,
        },
        warning,
    }
}
