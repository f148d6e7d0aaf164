//! End-to-end settlement tests for the allowance engine.
//!
//! This test suite drives full settlement runs through the orchestrator:
//! - Entry-month proration and full months
//! - Study allowance across academic years
//! - Early-exit study policy
//! - Withdrawal-month living selection
//! - One-time baggage allowance
//! - Duplicate prevention, restore and concurrency
//! - Failure without partial persistence
//! - CSV import and export, reporting

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use allowance_engine::calculation::months_between_inclusive;
use allowance_engine::config::{ConfigLoader, ConfigStore, ConfigValues};
use allowance_engine::error::EngineError;
use allowance_engine::export::write_csv;
use allowance_engine::import::read_students;
use allowance_engine::models::{
    AllowanceLineItem, AllowanceType, DegreeLevel, RunStatus, SettlementMonth, Student,
    StudentStatus,
};
use allowance_engine::report::summarize;
use allowance_engine::settlement::{
    InMemorySettlementStore, RestoreMode, SettlementOrchestrator, SettlementStore,
    SpecialPaymentSelection,
};

// =============================================================================
// Test Helpers
// =============================================================================

type Directory = Arc<RwLock<Vec<Student>>>;
type Orchestrator = SettlementOrchestrator<InMemorySettlementStore, Directory>;

const TEST_CONFIG: &str = r#"
living_allowance_usd:
  bachelor: "500.00"
  master: "550.00"
  phd: "600.00"
study_allowance_usd: "1000.00"
baggage_allowance_usd: "1500.00"
fx_rate_usd_to_cny: "7.20"
"#;

fn decimal(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn month(s: &str) -> SettlementMonth {
    s.parse().unwrap()
}

fn test_values() -> ConfigValues {
    ConfigLoader::from_yaml_str(TEST_CONFIG).expect("Failed to parse test config")
}

fn create_config_store(values: ConfigValues) -> Arc<ConfigStore> {
    let store = ConfigStore::new();
    store.save(values).expect("Failed to save config");
    Arc::new(store)
}

fn in_study(id: &str, entry: NaiveDate) -> Student {
    Student {
        student_id: id.to_string(),
        name: format!("Student {}", id),
        degree_level: DegreeLevel::Bachelor,
        first_entry_date: entry,
        status: StudentStatus::InStudy,
        graduation_date: None,
        withdrawal_date: None,
    }
}

fn create_orchestrator(values: ConfigValues, students: Vec<Student>) -> (Orchestrator, Directory) {
    let directory: Directory = Arc::new(RwLock::new(students));
    let orchestrator = SettlementOrchestrator::new(
        create_config_store(values),
        Arc::new(InMemorySettlementStore::new()),
        Arc::clone(&directory),
    );
    (orchestrator, directory)
}

fn run(orchestrator: &Orchestrator, m: &str) -> allowance_engine::models::SettlementOutcome {
    orchestrator
        .run_settlement(month(m), &SpecialPaymentSelection::new())
        .expect("Settlement run failed")
}

fn items_of_type(items: &[AllowanceLineItem], allowance_type: AllowanceType) -> Vec<&AllowanceLineItem> {
    items
        .iter()
        .filter(|i| i.allowance_type == allowance_type)
        .collect()
}

fn update_student(directory: &Directory, id: &str, f: impl FnOnce(&mut Student)) {
    let mut students = directory.write().unwrap();
    let student = students.iter_mut().find(|s| s.student_id == id).unwrap();
    f(student);
}

// =============================================================================
// Living Allowance
// =============================================================================

#[test]
fn test_entry_month_prorated_then_full_month() {
    let (orchestrator, _) =
        create_orchestrator(test_values(), vec![in_study("S001", date(2024, 9, 10))]);

    let september = run(&orchestrator, "2024-09");
    assert_eq!(september.status, RunStatus::Persisted);
    assert_eq!(september.line_items.len(), 1);
    let entry = &september.line_items[0];
    assert_eq!(entry.rule_id, "living_entry_prorate");
    assert_eq!(entry.amount_usd, decimal("350"));
    assert_eq!(entry.amount_cny, decimal("2520.00"));
    assert_eq!(entry.metadata["days_counted"], "21");
    assert_eq!(entry.metadata["days_in_month"], "30");

    let october = run(&orchestrator, "2024-10");
    let living = items_of_type(&october.line_items, AllowanceType::Living);
    assert_eq!(living.len(), 1);
    assert_eq!(living[0].rule_id, "living_full_month");
    assert_eq!(living[0].amount_usd, decimal("500"));
    assert_eq!(living[0].amount_cny, decimal("3600.00"));
}

#[test]
fn test_no_items_before_entry_month() {
    let (orchestrator, _) =
        create_orchestrator(test_values(), vec![in_study("S001", date(2024, 9, 10))]);

    let outcome = run(&orchestrator, "2024-08");
    assert!(outcome.line_items.is_empty());
    assert_eq!(outcome.audit_trace.steps.len(), 3);
}

#[test]
fn test_withdrawal_month_needs_selection_or_default() {
    let mut student = in_study("S001", date(2024, 3, 1));
    student.status = StudentStatus::Withdrawn;
    student.withdrawal_date = Some(date(2025, 5, 20));

    let (orchestrator, _) = create_orchestrator(test_values(), vec![student.clone()]);
    assert_eq!(run(&orchestrator, "2025-04").line_items.len(), 1);
    assert!(run(&orchestrator, "2025-05").line_items.is_empty());

    let selected = orchestrator
        .run_settlement(
            month("2025-05"),
            &SpecialPaymentSelection::new().with_withdrawal(["S001"]),
        )
        .unwrap();
    assert_eq!(selected.line_items.len(), 1);
    assert_eq!(selected.line_items[0].rule_id, "living_withdrawal_month");

    let mut values = test_values();
    values.withdrawn_living_default = true;
    let (by_default, _) = create_orchestrator(values, vec![student]);
    let outcome = run(&by_default, "2025-05");
    assert_eq!(outcome.line_items.len(), 1);
    assert_eq!(outcome.line_items[0].metadata["withdrawal_basis"], "policy_default");
    assert!(run(&by_default, "2025-06").line_items.is_empty());
}

// =============================================================================
// Study Allowance
// =============================================================================

#[test]
fn test_study_allowance_once_per_october_for_five_years() {
    let (orchestrator, _) =
        create_orchestrator(test_values(), vec![in_study("S001", date(2024, 9, 10))]);

    let mut study_items = Vec::new();
    for m in months_between_inclusive(month("2024-09"), month("2029-08")) {
        let outcome = orchestrator
            .run_settlement(m, &SpecialPaymentSelection::new())
            .unwrap();
        let study = items_of_type(&outcome.line_items, AllowanceType::Study);
        if m.month() != 10 {
            assert!(study.is_empty(), "study item issued in {}", m);
        }
        study_items.extend(study.into_iter().cloned());
    }

    assert_eq!(study_items.len(), 5);
    let years: Vec<String> = study_items
        .iter()
        .map(|i| i.metadata["academic_year"].clone())
        .collect();
    assert_eq!(years, vec!["2024", "2025", "2026", "2027", "2028"]);
    assert!(study_items.iter().all(|i| i.amount_cny == decimal("7200.00")));
}

#[test]
fn test_early_exit_study_policy() {
    let mut student = in_study("S001", date(2024, 3, 1));
    student.status = StudentStatus::Withdrawn;
    student.withdrawal_date = Some(date(2024, 8, 15));

    let (policy_off, _) = create_orchestrator(test_values(), vec![student.clone()]);
    let outcome = run(&policy_off, "2024-10");
    assert!(items_of_type(&outcome.line_items, AllowanceType::Study).is_empty());

    let mut values = test_values();
    values.policy_issue_study_if_exit_before_oct_entry_year = true;
    let (policy_on, _) = create_orchestrator(values, vec![student]);

    let mut total = 0;
    for m in months_between_inclusive(month("2024-03"), month("2025-12")) {
        let outcome = policy_on.run_settlement(m, &SpecialPaymentSelection::new()).unwrap();
        let study = items_of_type(&outcome.line_items, AllowanceType::Study);
        for item in &study {
            assert_eq!(item.rule_id, "study_entry_year_override");
            assert_eq!(item.period_start, date(2024, 10, 1));
        }
        total += study.len();
    }
    assert_eq!(total, 1);
}

// =============================================================================
// Baggage Allowance
// =============================================================================

#[test]
fn test_baggage_paid_once_after_graduation() {
    let (orchestrator, directory) =
        create_orchestrator(test_values(), vec![in_study("S001", date(2022, 9, 1))]);
    let selection = SpecialPaymentSelection::new().with_baggage(["S001"]);

    let early = orchestrator.run_settlement(month("2026-05"), &selection).unwrap();
    assert!(items_of_type(&early.line_items, AllowanceType::ExcessBaggage).is_empty());
    assert_eq!(early.warnings()[0].code, "baggage_not_graduated");

    update_student(&directory, "S001", |s| {
        s.status = StudentStatus::Graduated;
        s.graduation_date = Some(date(2026, 6, 30));
    });

    let june = orchestrator.run_settlement(month("2026-06"), &selection).unwrap();
    let baggage = items_of_type(&june.line_items, AllowanceType::ExcessBaggage);
    assert_eq!(baggage.len(), 1);
    assert_eq!(baggage[0].amount_cny, decimal("10800.00"));
    assert_eq!(baggage[0].period_start, date(2026, 6, 30));

    let july = orchestrator.run_settlement(month("2026-07"), &selection).unwrap();
    assert!(july.line_items.is_empty());
    assert!(july.warnings().iter().any(|w| w.code == "duplicate_line_item"));

    let paid: usize = orchestrator
        .store()
        .all_line_items()
        .unwrap()
        .iter()
        .filter(|i| i.allowance_type == AllowanceType::ExcessBaggage)
        .count();
    assert_eq!(paid, 1);
}

#[test]
fn test_baggage_requires_selection() {
    let mut student = in_study("S001", date(2022, 9, 1));
    student.status = StudentStatus::Graduated;
    student.graduation_date = Some(date(2026, 6, 30));

    let (orchestrator, _) = create_orchestrator(test_values(), vec![student]);
    let outcome = run(&orchestrator, "2026-06");
    assert!(items_of_type(&outcome.line_items, AllowanceType::ExcessBaggage).is_empty());
    assert_eq!(items_of_type(&outcome.line_items, AllowanceType::Living).len(), 1);
}

// =============================================================================
// Duplicate Prevention & Restore
// =============================================================================

#[test]
fn test_rerun_same_month_pays_nothing_new() {
    let students = vec![
        in_study("S001", date(2024, 9, 10)),
        in_study("S002", date(2023, 9, 1)),
    ];
    let (orchestrator, _) = create_orchestrator(test_values(), students);

    let first = run(&orchestrator, "2024-10");
    assert_eq!(first.line_items.len(), 4);

    let second = run(&orchestrator, "2024-10");
    assert!(second.line_items.is_empty());
    assert_eq!(second.warnings().len(), 4);
    assert_eq!(second.status, RunStatus::Persisted);

    let store = orchestrator.store();
    assert_eq!(store.runs().unwrap().len(), 2);
    assert_eq!(
        store.latest_run_for_month(month("2024-10")).unwrap(),
        Some(second.run.clone())
    );
    assert_eq!(store.all_line_items().unwrap().len(), 4);
}

#[test]
fn test_restored_store_does_not_repay() {
    let (orchestrator, _) =
        create_orchestrator(test_values(), vec![in_study("S001", date(2024, 9, 10))]);
    run(&orchestrator, "2024-09");
    run(&orchestrator, "2024-10");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settlement-backup.json");
    orchestrator.store().write_backup(&path).unwrap();

    let restored = Arc::new(InMemorySettlementStore::new());
    let backup = InMemorySettlementStore::read_backup(&path).unwrap();
    let summary = restored.restore(backup, RestoreMode::Replace).unwrap();
    assert_eq!(summary.runs_restored, 2);

    let after_restore = SettlementOrchestrator::new(
        create_config_store(test_values()),
        Arc::clone(&restored),
        vec![in_study("S001", date(2024, 9, 10))],
    );
    let outcome = after_restore
        .run_settlement(month("2024-10"), &SpecialPaymentSelection::new())
        .unwrap();
    assert!(outcome.line_items.is_empty());
    assert_eq!(outcome.warnings().len(), 2);

    let november = after_restore
        .run_settlement(month("2024-11"), &SpecialPaymentSelection::new())
        .unwrap();
    assert_eq!(november.line_items.len(), 1);
}

#[test]
fn test_deleted_run_can_be_settled_again() {
    let (orchestrator, _) =
        create_orchestrator(test_values(), vec![in_study("S001", date(2024, 9, 10))]);
    let first = run(&orchestrator, "2024-11");
    assert!(orchestrator.store().delete_run(first.run.run_id).unwrap());

    let again = run(&orchestrator, "2024-11");
    assert_eq!(again.line_items.len(), 1);
    assert_ne!(again.run.run_id, first.run.run_id);
}

// =============================================================================
// Configuration Versions
// =============================================================================

#[test]
fn test_runs_keep_their_config_version() {
    let config = create_config_store(test_values());
    let store = Arc::new(InMemorySettlementStore::new());
    let orchestrator = SettlementOrchestrator::new(
        Arc::clone(&config),
        Arc::clone(&store),
        vec![in_study("S001", date(2024, 9, 10))],
    );

    let october = orchestrator
        .run_settlement(month("2024-10"), &SpecialPaymentSelection::new())
        .unwrap();

    let mut values = test_values();
    values.fx_rate_usd_to_cny = decimal("7.30");
    config.save(values).unwrap();

    let november = orchestrator
        .run_settlement(month("2024-11"), &SpecialPaymentSelection::new())
        .unwrap();

    assert_eq!(october.run.config_version, 1);
    assert_eq!(november.run.config_version, 2);
    assert_eq!(november.line_items[0].amount_cny, decimal("3650.00"));

    let stored = store.line_items(october.run.run_id).unwrap();
    assert!(stored.iter().all(|i| i.fx_rate == decimal("7.20")));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_runs_for_different_months() {
    let students: Vec<Student> = (1..=20)
        .map(|i| in_study(&format!("S{:03}", i), date(2024, 9, 1)))
        .collect();
    let (orchestrator, _) = create_orchestrator(test_values(), students);
    let months = months_between_inclusive(month("2024-09"), month("2025-08"));

    std::thread::scope(|scope| {
        for m in &months {
            let orchestrator = &orchestrator;
            scope.spawn(move || {
                orchestrator
                    .run_settlement(*m, &SpecialPaymentSelection::new())
                    .unwrap();
            });
        }
    });

    let items = orchestrator.store().all_line_items().unwrap();
    assert_eq!(orchestrator.store().runs().unwrap().len(), 12);
    assert_eq!(items_of_type(&items, AllowanceType::Living).len(), 20 * 12);
    assert_eq!(items_of_type(&items, AllowanceType::Study).len(), 20);
}

#[test]
fn test_concurrent_runs_for_same_month_never_double_pay() {
    let (orchestrator, _) =
        create_orchestrator(test_values(), vec![in_study("S001", date(2024, 9, 10))]);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let orchestrator = &orchestrator;
            scope.spawn(move || {
                orchestrator
                    .run_settlement(month("2024-10"), &SpecialPaymentSelection::new())
                    .unwrap();
            });
        }
    });

    let store = orchestrator.store();
    assert_eq!(store.runs().unwrap().len(), 4);
    assert_eq!(store.all_line_items().unwrap().len(), 2);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_invalid_student_fails_whole_run() {
    let mut broken = in_study("S002", date(2024, 9, 1));
    broken.status = StudentStatus::Withdrawn;

    let (orchestrator, _) = create_orchestrator(
        test_values(),
        vec![in_study("S001", date(2024, 9, 1)), broken],
    );
    let result = orchestrator.run_settlement(month("2024-10"), &SpecialPaymentSelection::new());

    match result {
        Err(EngineError::RunFailed { source, .. }) => match *source {
            EngineError::InvalidStudent { student_id, field, .. } => {
                assert_eq!(student_id, "S002");
                assert_eq!(field, "withdrawal_date");
            }
            other => panic!("Expected InvalidStudent, got {:?}", other),
        },
        other => panic!("Expected RunFailed, got {:?}", other),
    }
    assert!(orchestrator.store().runs().unwrap().is_empty());
    assert!(orchestrator.store().history().unwrap().is_empty());
}

#[test]
fn test_no_config_fails() {
    let orchestrator = SettlementOrchestrator::new(
        Arc::new(ConfigStore::new()),
        Arc::new(InMemorySettlementStore::new()),
        vec![in_study("S001", date(2024, 9, 1))],
    );
    let result = orchestrator.run_settlement(month("2024-10"), &SpecialPaymentSelection::new());
    assert!(matches!(result, Err(EngineError::NoConfig)));
}

// =============================================================================
// Import, Export & Reporting
// =============================================================================

#[test]
fn test_import_settle_export_report() {
    let roster = "student_id,name,degree_level,first_entry_date,graduation_date,status,withdrawal_date\n\
                  S001,Aisha,Bachelor,2024-09-10,,In-study,\n\
                  S002,Bilal,PhD,2021-09-01,2024-10-15,Graduated,\n";
    let students = read_students(roster.as_bytes()).unwrap();
    let (orchestrator, _) = create_orchestrator(test_values(), students);

    let outcome = orchestrator
        .run_settlement(
            month("2024-10"),
            &SpecialPaymentSelection::new().with_baggage(["S002"]),
        )
        .unwrap();

    let types: Vec<(&str, AllowanceType)> = outcome
        .line_items
        .iter()
        .map(|i| (i.student_id.as_str(), i.allowance_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("S001", AllowanceType::Living),
            ("S001", AllowanceType::Study),
            ("S002", AllowanceType::Living),
            ("S002", AllowanceType::Study),
            ("S002", AllowanceType::ExcessBaggage),
        ]
    );

    let mut csv = Vec::new();
    write_csv(&mut csv, &outcome.run, &outcome.line_items).unwrap();
    let text = String::from_utf8(csv).unwrap();
    assert_eq!(text.lines().count(), 6);
    assert!(text.contains("S002,ExcessBaggage,2024-10-15,2024-10-15,1500.00,7.20,10800.00"));

    let summary = summarize(&outcome.line_items);
    assert_eq!(summary.grand_total.cny, outcome.total_cny());
    assert_eq!(summary.by_student["S002"].total.usd, decimal("3100"));
    assert_eq!(
        summary.by_type[&AllowanceType::Study].cny,
        decimal("14400.00")
    );
}

#[test]
fn test_default_config_file_loads() {
    let values = ConfigLoader::load("./config/allowances.yaml").unwrap();
    let (orchestrator, _) = create_orchestrator(values, vec![in_study("S001", date(2024, 1, 10))]);

    let january = run(&orchestrator, "2024-01");
    let item = &january.line_items[0];
    // 300 × 22/31 at 7.10, rounded once at the end.
    assert_eq!(item.amount_cny, decimal("1511.61"));
    assert_eq!(item.metadata["rounding_policy"], "final_only");

    let by_rule: BTreeMap<&str, usize> =
        january.line_items.iter().fold(BTreeMap::new(), |mut acc, i| {
            *acc.entry(i.rule_id.as_str()).or_default() += 1;
            acc
        });
    assert_eq!(by_rule.get("living_entry_prorate"), Some(&1));
}
