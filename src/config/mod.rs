//! Configuration loading and versioning for the allowance settlement engine.
//!
//! This module provides functionality to load allowance parameters from YAML
//! files and to keep an append-only history of versioned configuration
//! snapshots that settlement runs reference.
//!
//! # Example
//!
//! ```no_run
//! use allowance_engine::config::{ConfigLoader, ConfigStore};
//!
//! let store = ConfigStore::new();
//! let snapshot = store.save(ConfigLoader::load("./config/allowances.yaml").unwrap()).unwrap();
//! println!("FX rate in use: {}", snapshot.fx_rate());
//! ```

mod loader;
mod store;
mod types;

pub use loader::ConfigLoader;
pub use store::ConfigStore;
pub use types::{ConfigValues, ConfigurationSnapshot, LivingAllowanceRates, RoundingPolicy};
