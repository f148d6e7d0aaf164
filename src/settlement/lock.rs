//! Per-month run serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::SettlementMonth;

/// Hands out one mutex per settlement month.
///
/// Runs for the same month hold the same mutex and therefore execute one at a
/// time; runs for different months never contend.
#[derive(Debug, Default)]
pub struct MonthLocks {
    locks: Mutex<HashMap<SettlementMonth, Arc<Mutex<()>>>>,
}

impl MonthLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `month`, creating it on first use.
    pub fn lock_for(&self, month: SettlementMonth) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(month).or_default())
    }
}
