//! Settlement run models for the allowance settlement engine.
//!
//! This module contains the [`SettlementRun`] record and the structures that
//! accompany a run's outcome: its accepted line items, warnings, and the audit
//! trace of every rule evaluation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AllowanceLineItem, SettlementMonth};

/// Lifecycle of a settlement run.
///
/// `Pending → Computed → Persisted` on success, `Pending → Failed` or
/// `Computed → Failed` otherwise. `Persisted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Inputs loaded, rules not yet evaluated.
    Pending,
    /// All students evaluated; line items accepted but not yet stored.
    Computed,
    /// Run and line items stored atomically.
    Persisted,
    /// Aborted; nothing was stored.
    Failed,
}

impl RunStatus {
    /// Returns true if moving from `self` to `next` is a legal transition.
    ///
    /// # Example
    ///
    /// ```
    /// use allowance_engine::models::RunStatus;
    ///
    /// assert!(RunStatus::Pending.can_transition_to(RunStatus::Computed));
    /// assert!(!RunStatus::Persisted.can_transition_to(RunStatus::Failed));
    /// ```
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Computed)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Computed, RunStatus::Persisted)
                | (RunStatus::Computed, RunStatus::Failed)
        )
    }

    /// Returns true for `Persisted` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Persisted | RunStatus::Failed)
    }
}

/// An immutable record of one settlement computation.
///
/// The configuration version and FX rate are copied at run time so later
/// configuration edits never change what a past run paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRun {
    /// Unique identifier generated at creation.
    pub run_id: Uuid,
    /// The month this run settled.
    pub settlement_month: SettlementMonth,
    /// Version of the configuration snapshot used.
    pub config_version: u32,
    /// The USD to CNY rate used for every line in the run.
    pub fx_rate: Decimal,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
}

/// A single step in the audit trace recording a rule decision.
///
/// Each step captures the input, output, and reasoning for a rule application
/// to one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStep {
    /// The sequential step number within the run.
    pub step_number: u32,
    /// The student the rule was evaluated for.
    pub student_id: String,
    /// The identifier of the rule branch that decided the outcome.
    pub rule_id: String,
    /// The human-readable name of the rule.
    pub rule_name: String,
    /// The input data for this step.
    pub input: serde_json::Value,
    /// The output data from this step.
    pub output: serde_json::Value,
    /// Human-readable explanation of the decision.
    pub reasoning: String,
}

/// A warning attached to a successful run.
///
/// Warnings never fail a run; they report skipped duplicates and special
/// payment selections that could not be honoured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditWarning {
    /// A code identifying the type of warning.
    pub code: String,
    /// The student concerned, if any.
    pub student_id: Option<String>,
    /// A human-readable description of the warning.
    pub message: String,
    /// The severity level (e.g., "low", "medium", "high").
    pub severity: String,
}

impl AuditWarning {
    /// Creates a warning about a specific student.
    pub fn for_student(
        code: impl Into<String>,
        student_id: impl Into<String>,
        message: impl Into<String>,
        severity: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            student_id: Some(student_id.into()),
            message: message.into(),
            severity: severity.into(),
        }
    }
}

/// The complete audit trace for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrace {
    /// The sequence of rule evaluation steps.
    pub steps: Vec<AuditStep>,
    /// Any warnings generated during the run.
    pub warnings: Vec<AuditWarning>,
    /// The total computation duration in microseconds.
    pub duration_us: u64,
}

/// The result of a successful settlement call.
///
/// Line items are ordered by `student_id`, then allowance type, then period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    /// The persisted run.
    pub run: SettlementRun,
    /// Final status of the run; always `Persisted` for a returned outcome.
    pub status: RunStatus,
    /// The line items stored with the run.
    pub line_items: Vec<AllowanceLineItem>,
    /// Complete audit trace, including warnings.
    pub audit_trace: AuditTrace,
}

impl SettlementOutcome {
    /// Warnings attached to the run.
    pub fn warnings(&self) -> &[AuditWarning] {
        &self.audit_trace.warnings
    }

    /// Sum of all line items in USD.
    pub fn total_usd(&self) -> Decimal {
        self.line_items.iter().map(|item| item.amount_usd).sum()
    }

    /// Sum of all line items in CNY.
    pub fn total_cny(&self) -> Decimal {
        self.line_items.iter().map(|item| item.amount_cny).sum()
    }
}
