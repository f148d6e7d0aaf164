//! Versioned configuration store.
//!
//! Every save appends a new [`ConfigurationSnapshot`]; existing versions are
//! never touched, so a run that recorded version `n` can always be explained
//! against the exact values it used.

use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::{EngineError, EngineResult};

use super::types::{ConfigValues, ConfigurationSnapshot};

/// Append-only history of configuration snapshots.
///
/// # Example
///
/// ```
/// use allowance_engine::config::{ConfigLoader, ConfigStore};
/// use allowance_engine::error::EngineError;
///
/// let store = ConfigStore::new();
/// assert!(matches!(store.current(), Err(EngineError::NoConfig)));
///
/// let values = ConfigLoader::load("./config/allowances.yaml")?;
/// let first = store.save(values.clone())?;
/// let second = store.save(values)?;
/// assert_eq!(first.version() + 1, second.version());
/// assert_eq!(store.current()?.version(), second.version());
/// # Ok::<(), EngineError>(())
/// ```
#[derive(Debug, Default)]
pub struct ConfigStore {
    snapshots: RwLock<Vec<Arc<ConfigurationSnapshot>>>,
}

impl ConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latest saved snapshot, or `NoConfig` if nothing was saved.
    pub fn current(&self) -> EngineResult<Arc<ConfigurationSnapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots.last().cloned().ok_or(EngineError::NoConfig)
    }

    /// Validates `values` and saves them as a new version.
    pub fn save(&self, values: ConfigValues) -> EngineResult<Arc<ConfigurationSnapshot>> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(|e| e.into_inner());
        let version = snapshots.last().map_or(1, |s| s.version() + 1);
        let snapshot = Arc::new(ConfigurationSnapshot::new(version, values)?);
        snapshots.push(Arc::clone(&snapshot));

        info!(
            config_version = version,
            fx_rate = %snapshot.fx_rate(),
            "Saved configuration snapshot"
        );
        Ok(snapshot)
    }

    /// Returns a specific version, if it exists.
    pub fn get(&self, version: u32) -> Option<Arc<ConfigurationSnapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots.iter().find(|s| s.version() == version).cloned()
    }

    /// All saved version numbers, oldest first.
    pub fn versions(&self) -> Vec<u32> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots.iter().map(|s| s.version()).collect()
    }
}
