//! Settlement run orchestration.
//!
//! A run loads the current configuration and student population, evaluates
//! every allowance rule for every student, filters out anything already paid,
//! and commits the run with its accepted line items in a single step.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::calculation::{
    PaidLedger, calculate_baggage_allowance, calculate_living_allowance,
    calculate_study_allowance,
};
use crate::config::{ConfigStore, ConfigurationSnapshot};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AllowanceLine, AuditStep, AuditTrace, AuditWarning, RunStatus, SettlementMonth,
    SettlementOutcome, SettlementRun, Student,
};

use super::directory::StudentDirectory;
use super::lock::MonthLocks;
use super::store::SettlementStore;

/// Students explicitly chosen for one-off payments in a run.
///
/// # Example
///
/// ```
/// use allowance_engine::settlement::SpecialPaymentSelection;
///
/// let selection = SpecialPaymentSelection::new()
///     .with_baggage(["S001"])
///     .with_withdrawal(["S002", "S003"]);
/// assert!(selection.baggage.contains("S001"));
/// assert_eq!(selection.withdrawal.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialPaymentSelection {
    /// Students selected for the excess baggage allowance.
    pub baggage: BTreeSet<String>,
    /// Students selected for withdrawal-month living allowance.
    pub withdrawal: BTreeSet<String>,
}

impl SpecialPaymentSelection {
    /// An empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds students to the baggage selection.
    pub fn with_baggage<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.baggage.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Adds students to the withdrawal-month selection.
    pub fn with_withdrawal<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.withdrawal.extend(ids.into_iter().map(Into::into));
        self
    }
}

/// Lines and audit records produced by evaluating every rule for every student.
struct Evaluation {
    lines: Vec<AllowanceLine>,
    steps: Vec<AuditStep>,
    warnings: Vec<AuditWarning>,
}

/// Runs settlements against a configuration store, a settlement store and a
/// student directory.
///
/// Runs for the same month are serialized; runs for different months evaluate
/// in parallel and only meet briefly when they commit.
pub struct SettlementOrchestrator<S, D> {
    config: Arc<ConfigStore>,
    store: Arc<S>,
    directory: D,
    month_locks: MonthLocks,
    commit_lock: Mutex<()>,
}

impl<S, D> SettlementOrchestrator<S, D>
where
    S: SettlementStore,
    D: StudentDirectory,
{
    /// Creates an orchestrator over the given collaborators.
    pub fn new(config: Arc<ConfigStore>, store: Arc<S>, directory: D) -> Self {
        Self {
            config,
            store,
            directory,
            month_locks: MonthLocks::new(),
            commit_lock: Mutex::new(()),
        }
    }

    /// The settlement store runs are committed to.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Settles one month.
    ///
    /// # Errors
    ///
    /// - `NoConfig` if no configuration has been saved
    /// - `RunFailed` wrapping the first invalid or repeated student, or a failed commit;
    ///   nothing is persisted in either case
    ///
    /// Already-paid items are skipped and reported as `duplicate_line_item`
    /// warnings on the returned outcome.
    pub fn run_settlement(
        &self,
        month: SettlementMonth,
        selection: &SpecialPaymentSelection,
    ) -> EngineResult<SettlementOutcome> {
        let start_time = Instant::now();
        let month_lock = self.month_locks.lock_for(month);
        let _month_guard = month_lock.lock().unwrap_or_else(|e| e.into_inner());

        let config = self.config.current()?;
        let run_id = Uuid::new_v4();
        let mut status = RunStatus::Pending;
        info!(
            run_id = %run_id,
            settlement_month = %month,
            config_version = config.version(),
            "Starting settlement run"
        );

        let evaluation = match self.evaluate(month, &config, selection) {
            Ok(evaluation) => evaluation,
            Err(err) => {
                status = transition(status, RunStatus::Failed);
                warn!(
                    run_id = %run_id,
                    settlement_month = %month,
                    config_version = config.version(),
                    status = ?status,
                    error = %err,
                    "Settlement run failed during evaluation"
                );
                return Err(EngineError::run_failed(month.to_string(), err));
            }
        };
        status = transition(status, RunStatus::Computed);

        let Evaluation {
            lines,
            steps,
            mut warnings,
        } = evaluation;
        debug!(
            run_id = %run_id,
            settlement_month = %month,
            config_version = config.version(),
            status = ?status,
            proposed_lines = lines.len(),
            audit_steps = steps.len(),
            "Settlement run computed"
        );

        let run = SettlementRun {
            run_id,
            settlement_month: month,
            config_version: config.version(),
            fx_rate: config.fx_rate(),
            created_at: Utc::now(),
        };

        let line_items = {
            let _commit_guard = self.commit_lock.lock().unwrap_or_else(|e| e.into_inner());
            let committed = self
                .store
                .history()
                .map(|history| accept_lines(lines, &history, &mut warnings))
                .and_then(|accepted| {
                    let items: Vec<_> = accepted
                        .into_iter()
                        .map(|line| line.into_line_item(run_id, month))
                        .collect();
                    self.store.commit(run.clone(), items.clone()).map(|()| items)
                });

            match committed {
                Ok(items) => items,
                Err(err) => {
                    status = transition(status, RunStatus::Failed);
                    warn!(
                        run_id = %run_id,
                        settlement_month = %month,
                        config_version = config.version(),
                        status = ?status,
                        error = %err,
                        "Settlement run failed to persist"
                    );
                    return Err(EngineError::run_failed(month.to_string(), err));
                }
            }
        };
        status = transition(status, RunStatus::Persisted);

        let duration_us = start_time.elapsed().as_micros() as u64;
        let outcome = SettlementOutcome {
            run,
            status,
            line_items,
            audit_trace: AuditTrace {
                steps,
                warnings,
                duration_us,
            },
        };

        info!(
            run_id = %run_id,
            settlement_month = %month,
            config_version = config.version(),
            status = ?outcome.status,
            line_items = outcome.line_items.len(),
            warnings = outcome.warnings().len(),
            total_cny = %outcome.total_cny(),
            duration_us,
            "Settlement run persisted"
        );
        Ok(outcome)
    }

    /// Evaluates all rules for all students without touching the store.
    fn evaluate(
        &self,
        month: SettlementMonth,
        config: &ConfigurationSnapshot,
        selection: &SpecialPaymentSelection,
    ) -> EngineResult<Evaluation> {
        let mut students = self.directory.students()?;
        students.sort_by(|a, b| a.student_id.cmp(&b.student_id));

        for student in &students {
            student.validate()?;
        }
        if let Some(pair) = students.windows(2).find(|w| w[0].student_id == w[1].student_id) {
            return Err(EngineError::invalid_student(
                pair[1].student_id.clone(),
                "student_id",
                "is not unique",
            ));
        }

        let history = self.store.history()?;
        let mut evaluation = Evaluation {
            lines: Vec::new(),
            steps: Vec::new(),
            warnings: unknown_selections(&students, selection),
        };
        let mut step_number: u32 = 1;

        for student in &students {
            debug!(student_id = %student.student_id, settlement_month = %month, "Evaluating student");
            let withdrawal_selected = selection.withdrawal.contains(&student.student_id);
            let baggage_selected = selection.baggage.contains(&student.student_id);

            let living =
                calculate_living_allowance(student, config, month, withdrawal_selected, step_number)?;
            evaluation.steps.push(living.audit_step);
            evaluation.warnings.extend(living.warning);
            evaluation.lines.extend(living.line);
            step_number += 1;

            let study = calculate_study_allowance(student, config, month, step_number)?;
            evaluation.steps.push(study.audit_step);
            evaluation.lines.extend(study.line);
            step_number += 1;

            let baggage = calculate_baggage_allowance(
                student,
                config,
                month,
                &history,
                baggage_selected,
                step_number,
            )?;
            evaluation.steps.push(baggage.audit_step);
            evaluation.warnings.extend(baggage.warning);
            evaluation.lines.extend(baggage.line);
            step_number += 1;
        }

        Ok(evaluation)
    }
}

fn transition(from: RunStatus, to: RunStatus) -> RunStatus {
    debug_assert!(from.can_transition_to(to), "illegal run transition {:?} -> {:?}", from, to);
    to
}

/// Drops lines already paid in a persisted run, recording a warning for each.
fn accept_lines(
    lines: Vec<AllowanceLine>,
    history: &PaidLedger,
    warnings: &mut Vec<AuditWarning>,
) -> Vec<AllowanceLine> {
    let mut accepted = Vec::with_capacity(lines.len());
    let mut accepted_keys = HashSet::new();

    for line in lines {
        let duplicate = history
            .check(&line)
            .err()
            .or_else(|| {
                (!accepted_keys.insert(line.key())).then(|| EngineError::DuplicateLineItem {
                    student_id: line.student_id.clone(),
                    allowance_type: line.allowance_type,
                    period_start: line.period_start,
                    period_end: line.period_end,
                })
            });

        match duplicate {
            Some(err) => {
                warn!(student_id = %line.student_id, error = %err, "Skipping duplicate line item");
                warnings.push(AuditWarning::for_student(
                    "duplicate_line_item",
                    line.student_id.clone(),
                    err.to_string(),
                    "low",
                ));
            }
            None => accepted.push(line),
        }
    }

    accepted.sort_by(|a, b| a.key().cmp(&b.key()));
    accepted
}

/// Warns about selected ids that match no student.
fn unknown_selections(students: &[Student], selection: &SpecialPaymentSelection) -> Vec<AuditWarning> {
    let known: HashSet<&str> = students.iter().map(|s| s.student_id.as_str()).collect();

    selection
        .baggage
        .iter()
        .map(|id| (id, "baggage"))
        .chain(selection.withdrawal.iter().map(|id| (id, "withdrawal")))
        .filter(|(id, _)| !known.contains(id.as_str()))
        .map(|(id, kind)| AuditWarning {
            code: "unknown_selected_student".to_string(),
            student_id: Some(id.clone()),
            message: format!("Selected for {} payment but no such student exists", kind),
            severity: "medium".to_string(),
        })
        .collect()
}
