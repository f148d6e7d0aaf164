//! Storage of settlement runs and their line items.
//!
//! The engine only needs a small contract from storage: a snapshot of what has
//! been paid, and an all-or-nothing commit of one run with its items.
//! [`InMemorySettlementStore`] implements that contract behind an `RwLock` and
//! adds JSON backup and restore.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::calculation::{PaidLedger, PaymentHistory};
use crate::error::{EngineError, EngineResult};
use crate::models::{AllowanceLineItem, AllowanceType, SettlementMonth, SettlementRun};

/// Backup file format produced by [`InMemorySettlementStore::backup`].
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Durable storage for settlement runs.
pub trait SettlementStore: Send + Sync {
    /// Returns a snapshot of every persisted line item key.
    fn history(&self) -> EngineResult<PaidLedger>;

    /// Persists a run and all of its line items atomically.
    ///
    /// Fails with `PersistenceError`, writing nothing, if the run id already
    /// exists or any item key collides with a persisted item.
    fn commit(&self, run: SettlementRun, line_items: Vec<AllowanceLineItem>) -> EngineResult<()>;

    /// All runs, in commit order.
    fn runs(&self) -> EngineResult<Vec<SettlementRun>>;

    /// A single run by id.
    fn run(&self, run_id: Uuid) -> EngineResult<Option<SettlementRun>>;

    /// The line items of one run. Empty if the run does not exist.
    fn line_items(&self, run_id: Uuid) -> EngineResult<Vec<AllowanceLineItem>>;

    /// Every persisted line item across all runs.
    fn all_line_items(&self) -> EngineResult<Vec<AllowanceLineItem>>;

    /// The most recently committed run for a month.
    fn latest_run_for_month(&self, month: SettlementMonth) -> EngineResult<Option<SettlementRun>>;

    /// Deletes a run and its items, releasing their keys. Returns false if absent.
    fn delete_run(&self, run_id: Uuid) -> EngineResult<bool>;
}

/// A run together with the line items it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// The run header.
    pub run: SettlementRun,
    /// Items persisted with the run.
    pub line_items: Vec<AllowanceLineItem>,
}

/// Serializable copy of a store's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreBackup {
    /// Format version of this backup.
    pub format_version: u32,
    /// When the backup was taken.
    pub created_at: DateTime<Utc>,
    /// Every run with its items, in commit order.
    pub runs: Vec<RunRecord>,
}

/// How a backup is applied to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Discard current contents and load the backup.
    Replace,
    /// Keep current contents and add runs from the backup that do not conflict.
    Merge,
}

/// Counts reported by a restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Runs loaded from the backup.
    pub runs_restored: usize,
    /// Runs skipped because their id or an item key already existed.
    pub runs_skipped: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<RunRecord>,
    ledger: PaidLedger,
}

impl StoreState {
    fn contains_run(&self, run_id: Uuid) -> bool {
        self.records.iter().any(|r| r.run.run_id == run_id)
    }

    /// Checks that `record` can be added without breaking any store invariant.
    fn admit(&self, record: &RunRecord) -> EngineResult<()> {
        if self.contains_run(record.run.run_id) {
            return Err(EngineError::PersistenceError {
                message: format!("run {} already exists", record.run.run_id),
            });
        }

        let mut seen = HashSet::new();
        let mut baggage_students = HashSet::new();
        for item in &record.line_items {
            if item.run_id != record.run.run_id {
                return Err(EngineError::PersistenceError {
                    message: format!(
                        "line item for {} belongs to run {}, not {}",
                        item.student_id, item.run_id, record.run.run_id
                    ),
                });
            }
            let key = item.key();
            if self.ledger.contains(&key) || !seen.insert(key) {
                return Err(EngineError::PersistenceError {
                    message: format!(
                        "{} {} for {}..{} is already persisted",
                        item.student_id, item.allowance_type, item.period_start, item.period_end
                    ),
                });
            }
            // Baggage is once per student whatever its graduation date.
            if item.allowance_type == AllowanceType::ExcessBaggage
                && (self.ledger.has_paid(&item.student_id, AllowanceType::ExcessBaggage)
                    || !baggage_students.insert(item.student_id.as_str()))
            {
                return Err(EngineError::PersistenceError {
                    message: format!(
                        "{} has already been paid the excess baggage allowance",
                        item.student_id
                    ),
                });
            }
        }
        Ok(())
    }

    fn push(&mut self, record: RunRecord) {
        for item in &record.line_items {
            self.ledger.insert(item.key());
        }
        self.records.push(record);
    }
}

/// Thread-safe in-memory implementation of [`SettlementStore`].
///
/// # Example
///
/// ```
/// use allowance_engine::settlement::{InMemorySettlementStore, SettlementStore};
///
/// let store = InMemorySettlementStore::new();
/// assert!(store.runs().unwrap().is_empty());
/// assert!(store.history().unwrap().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemorySettlementStore {
    state: RwLock<StoreState>,
}

impl InMemorySettlementStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the full contents of the store.
    pub fn backup(&self) -> StoreBackup {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        StoreBackup {
            format_version: BACKUP_FORMAT_VERSION,
            created_at: Utc::now(),
            runs: state.records.clone(),
        }
    }

    /// Loads a backup into the store.
    ///
    /// The paid-key ledger is rebuilt from the restored items, so a restored
    /// store never pays a settled item again. `Replace` validates the whole
    /// backup before touching current contents; `Merge` skips runs that
    /// conflict with what is already stored.
    pub fn restore(&self, backup: StoreBackup, mode: RestoreMode) -> EngineResult<RestoreSummary> {
        if backup.format_version != BACKUP_FORMAT_VERSION {
            return Err(EngineError::PersistenceError {
                message: format!(
                    "unsupported backup format version {}",
                    backup.format_version
                ),
            });
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut summary = RestoreSummary::default();

        match mode {
            RestoreMode::Replace => {
                let mut replacement = StoreState::default();
                for record in backup.runs {
                    replacement.admit(&record)?;
                    replacement.push(record);
                    summary.runs_restored += 1;
                }
                *state = replacement;
            }
            RestoreMode::Merge => {
                for record in backup.runs {
                    match state.admit(&record) {
                        Ok(()) => {
                            state.push(record);
                            summary.runs_restored += 1;
                        }
                        Err(err) => {
                            warn!(run_id = %record.run.run_id, error = %err, "Skipping run during merge");
                            summary.runs_skipped += 1;
                        }
                    }
                }
            }
        }

        info!(
            mode = ?mode,
            runs_restored = summary.runs_restored,
            runs_skipped = summary.runs_skipped,
            "Restored settlement store"
        );
        Ok(summary)
    }

    /// Writes a backup of the store to `path` as pretty-printed JSON.
    pub fn write_backup<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.backup()).map_err(|e| {
            EngineError::PersistenceError {
                message: format!("failed to serialize backup: {}", e),
            }
        })?;
        fs::write(path, json).map_err(|e| EngineError::PersistenceError {
            message: format!("failed to write {}: {}", path.display(), e),
        })
    }

    /// Reads a backup previously written by [`write_backup`](Self::write_backup).
    pub fn read_backup<P: AsRef<Path>>(path: P) -> EngineResult<StoreBackup> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| EngineError::PersistenceError {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&content).map_err(|e| EngineError::PersistenceError {
            message: format!("failed to parse {}: {}", path.display(), e),
        })
    }
}

impl SettlementStore for InMemorySettlementStore {
    fn history(&self) -> EngineResult<PaidLedger> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.ledger.clone())
    }

    fn commit(&self, run: SettlementRun, line_items: Vec<AllowanceLineItem>) -> EngineResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let record = RunRecord { run, line_items };
        state.admit(&record)?;
        state.push(record);
        Ok(())
    }

    fn runs(&self) -> EngineResult<Vec<SettlementRun>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.records.iter().map(|r| r.run.clone()).collect())
    }

    fn run(&self, run_id: Uuid) -> EngineResult<Option<SettlementRun>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .records
            .iter()
            .find(|r| r.run.run_id == run_id)
            .map(|r| r.run.clone()))
    }

    fn line_items(&self, run_id: Uuid) -> EngineResult<Vec<AllowanceLineItem>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .records
            .iter()
            .find(|r| r.run.run_id == run_id)
            .map(|r| r.line_items.clone())
            .unwrap_or_default())
    }

    fn all_line_items(&self) -> EngineResult<Vec<AllowanceLineItem>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .records
            .iter()
            .flat_map(|r| r.line_items.iter().cloned())
            .collect())
    }

    fn latest_run_for_month(&self, month: SettlementMonth) -> EngineResult<Option<SettlementRun>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .records
            .iter()
            .rev()
            .find(|r| r.run.settlement_month == month)
            .map(|r| r.run.clone()))
    }

    fn delete_run(&self, run_id: Uuid) -> EngineResult<bool> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let before = state.records.len();
        state.records.retain(|r| r.run.run_id != run_id);
        if state.records.len() == before {
            return Ok(false);
        }
        state.ledger = PaidLedger::from_items(state.records.iter().flat_map(|r| r.line_items.iter()));
        info!(run_id = %run_id, "Deleted settlement run");
        Ok(true)
    }
}
