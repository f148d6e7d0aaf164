//! Payment history lookups for duplicate prevention.
//!
//! "Already paid" is a set-membership question over every persisted line item,
//! keyed by student, allowance type and period. Student records never carry
//! settlement-derived flags.

use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::models::{AllowanceLine, AllowanceLineItem, AllowanceType, LineItemKey};

/// Read access to what has already been paid.
pub trait PaymentHistory {
    /// Returns true if an item with exactly this key was persisted.
    fn contains(&self, key: &LineItemKey) -> bool;

    /// Returns true if any item of `allowance_type` was persisted for the student.
    fn has_paid(&self, student_id: &str, allowance_type: AllowanceType) -> bool;
}

/// An in-memory index of paid line item keys.
///
/// # Example
///
/// ```
/// use allowance_engine::calculation::{PaidLedger, PaymentHistory};
/// use allowance_engine::models::{AllowanceType, LineItemKey};
/// use chrono::NaiveDate;
///
/// let mut ledger = PaidLedger::new();
/// ledger.insert(LineItemKey {
///     student_id: "S001".to_string(),
///     allowance_type: AllowanceType::ExcessBaggage,
///     period_start: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
///     period_end: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
/// });
/// assert!(ledger.has_paid("S001", AllowanceType::ExcessBaggage));
/// assert!(!ledger.has_paid("S001", AllowanceType::Living));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaidLedger {
    keys: HashSet<LineItemKey>,
    paid_types: HashSet<(String, AllowanceType)>,
}

impl PaidLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from persisted line items.
    pub fn from_items<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a AllowanceLineItem>,
    {
        let mut ledger = Self::new();
        for item in items {
            ledger.insert(item.key());
        }
        ledger
    }

    /// Records a key as paid. Returns false if it was already present.
    pub fn insert(&mut self, key: LineItemKey) -> bool {
        self.paid_types
            .insert((key.student_id.clone(), key.allowance_type));
        self.keys.insert(key)
    }

    /// Fails with `DuplicateLineItem` if an equivalent line was already paid.
    pub fn check(&self, line: &AllowanceLine) -> EngineResult<()> {
        if self.keys.contains(&line.key()) {
            return Err(EngineError::DuplicateLineItem {
                student_id: line.student_id.clone(),
                allowance_type: line.allowance_type,
                period_start: line.period_start,
                period_end: line.period_end,
            });
        }
        Ok(())
    }

    /// Number of paid keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if nothing has been paid.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl PaymentHistory for PaidLedger {
    fn contains(&self, key: &LineItemKey) -> bool {
        self.keys.contains(key)
    }

    fn has_paid(&self, student_id: &str, allowance_type: AllowanceType) -> bool {
        self.paid_types
            .contains(&(student_id.to_string(), allowance_type))
    }
}
