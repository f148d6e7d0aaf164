//! Structured logging of settlement runs.
//!
//! Captures the JSON events a run emits and checks the fields finance tooling
//! relies on when correlating runs with configuration versions.

use std::io;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::Level;

use allowance_engine::config::{ConfigStore, ConfigValues, LivingAllowanceRates, RoundingPolicy};
use allowance_engine::models::{DegreeLevel, SettlementMonth, Student, StudentStatus};
use allowance_engine::settlement::{
    InMemorySettlementStore, SettlementOrchestrator, SpecialPaymentSelection,
};

// =============================================================================
// Test Helpers
// =============================================================================

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn events(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

/// Runs `f` with a JSON subscriber installed on this thread and returns its events.
fn capture<F: FnOnce()>(f: F) -> Vec<Value> {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    buffer.events()
}

fn event<'a>(events: &'a [Value], message: &str) -> &'a Value {
    events
        .iter()
        .find(|e| e["fields"]["message"] == message)
        .unwrap_or_else(|| panic!("no '{}' event in {:?}", message, events))
}

fn create_config_store(saves: usize) -> Arc<ConfigStore> {
    let store = ConfigStore::new();
    for _ in 0..saves {
        store
            .save(ConfigValues {
                living_allowance_usd: LivingAllowanceRates {
                    bachelor: Decimal::from(500),
                    master: Decimal::from(550),
                    phd: Decimal::from(600),
                },
                study_allowance_usd: Decimal::from(1000),
                baggage_allowance_usd: Decimal::from(1500),
                fx_rate_usd_to_cny: Decimal::from_str("7.20").unwrap(),
                policy_issue_study_if_exit_before_oct_entry_year: false,
                withdrawn_living_default: false,
                issue_study_if_entry_in_october: false,
                rounding_policy: RoundingPolicy::FinalOnly,
            })
            .unwrap();
    }
    Arc::new(store)
}

fn create_student(id: &str) -> Student {
    Student {
        student_id: id.to_string(),
        name: format!("Student {}", id),
        degree_level: DegreeLevel::Bachelor,
        first_entry_date: NaiveDate::from_ymd_opt(2024, 9, 10).unwrap(),
        status: StudentStatus::InStudy,
        graduation_date: None,
        withdrawal_date: None,
    }
}

fn november() -> SettlementMonth {
    SettlementMonth::new(2024, 11).unwrap()
}

// =============================================================================
// Run Transitions
// =============================================================================

#[test]
fn test_persisted_run_logs_config_version() {
    let orchestrator = SettlementOrchestrator::new(
        create_config_store(2),
        Arc::new(InMemorySettlementStore::new()),
        vec![create_student("S001")],
    );

    let events = capture(|| {
        orchestrator
            .run_settlement(november(), &SpecialPaymentSelection::new())
            .unwrap();
    });

    for message in [
        "Starting settlement run",
        "Settlement run computed",
        "Settlement run persisted",
    ] {
        let fields = &event(&events, message)["fields"];
        assert_eq!(fields["config_version"], 2, "{}", message);
        assert_eq!(fields["settlement_month"], "2024-11", "{}", message);
    }
    assert_eq!(event(&events, "Settlement run persisted")["fields"]["status"], "Persisted");
}

#[test]
fn test_failed_run_logs_config_version() {
    let mut broken = create_student("S002");
    broken.status = StudentStatus::Graduated;
    let orchestrator = SettlementOrchestrator::new(
        create_config_store(1),
        Arc::new(InMemorySettlementStore::new()),
        vec![create_student("S001"), broken],
    );

    let events = capture(|| {
        assert!(
            orchestrator
                .run_settlement(november(), &SpecialPaymentSelection::new())
                .is_err()
        );
    });

    let failed = event(&events, "Settlement run failed during evaluation");
    assert_eq!(failed["level"], "WARN");
    assert_eq!(failed["fields"]["config_version"], 1);
    assert_eq!(failed["fields"]["status"], "Failed");
}
