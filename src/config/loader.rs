//! Configuration loading functionality.
//!
//! This module provides the [`ConfigLoader`] type for reading allowance
//! configuration values from YAML files.

use std::fs;
use std::path::Path;

use crate::error::{EngineError, EngineResult};

use super::types::ConfigValues;

/// Loads allowance configuration values from YAML.
///
/// # File Format
///
/// ```text
/// living_allowance_usd:
///   bachelor: "300.00"
///   master: "350.00"
///   phd: "400.00"
/// study_allowance_usd: "800.00"
/// baggage_allowance_usd: "1200.00"
/// fx_rate_usd_to_cny: "7.10"
/// policy_issue_study_if_exit_before_oct_entry_year: false
/// withdrawn_living_default: false
/// issue_study_if_entry_in_october: false
/// rounding_policy: final_only
/// ```
///
/// # Example
///
/// ```no_run
/// use allowance_engine::config::{ConfigLoader, ConfigStore};
///
/// let values = ConfigLoader::load("./config/allowances.yaml")?;
/// let store = ConfigStore::new();
/// let snapshot = store.save(values)?;
/// println!("Saved configuration version {}", snapshot.version());
/// # Ok::<(), allowance_engine::error::EngineError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and validates configuration values from a YAML file.
    ///
    /// # Returns
    ///
    /// Returns the parsed values, or an error if:
    /// - The file is missing (`ConfigNotFound`)
    /// - The file contains invalid YAML or missing fields (`ConfigParseError`)
    /// - A value is out of range (`InvalidConfig`)
    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<ConfigValues> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|_| EngineError::ConfigNotFound {
            path: path_str.clone(),
        })?;

        Self::parse(&content, &path_str)
    }

    /// Parses configuration values from YAML text.
    pub fn from_yaml_str(content: &str) -> EngineResult<ConfigValues> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, source: &str) -> EngineResult<ConfigValues> {
        let values: ConfigValues =
            serde_yaml::from_str(content).map_err(|e| EngineError::ConfigParseError {
                path: source.to_string(),
                message: e.to_string(),
            })?;
        values.validate()?;
        Ok(values)
    }
}
