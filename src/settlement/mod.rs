//! Settlement runs: orchestration, locking and storage.
//!
//! [`SettlementOrchestrator::run_settlement`] is the entry point. It reads the
//! student population from a [`StudentDirectory`], the current configuration
//! from a [`ConfigStore`](crate::config::ConfigStore), and commits the result
//! to a [`SettlementStore`].

mod directory;
mod lock;
mod orchestrator;
mod store;

pub use directory::StudentDirectory;
pub use lock::MonthLocks;
pub use orchestrator::{SettlementOrchestrator, SpecialPaymentSelection};
pub use store::{
    BACKUP_FORMAT_VERSION, InMemorySettlementStore, RestoreMode, RestoreSummary, RunRecord,
    SettlementStore, StoreBackup,
};
