//! Configuration types for allowance settlement.
//!
//! This module contains the strongly-typed configuration structures. The
//! editable [`ConfigValues`] are deserialized from YAML; a saved, versioned
//! [`ConfigurationSnapshot`] is what rules and runs read.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::DegreeLevel;

/// Monthly living allowance rates in USD, per degree level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivingAllowanceRates {
    /// Monthly rate for Bachelor students.
    pub bachelor: Decimal,
    /// Monthly rate for Master students.
    pub master: Decimal,
    /// Monthly rate for PhD students.
    pub phd: Decimal,
}

impl LivingAllowanceRates {
    /// Returns the monthly rate for a degree level.
    pub fn for_degree(&self, degree_level: DegreeLevel) -> Decimal {
        match degree_level {
            DegreeLevel::Bachelor => self.bachelor,
            DegreeLevel::Master => self.master,
            DegreeLevel::PhD => self.phd,
        }
    }
}

/// When prorated USD amounts are rounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Keep USD at full precision and round only the converted CNY amount.
    #[default]
    FinalOnly,
    /// Round prorated USD to 2 decimal places first, then convert and round CNY.
    TwoStep,
}

impl RoundingPolicy {
    /// The label recorded in line item metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundingPolicy::FinalOnly => "final_only",
            RoundingPolicy::TwoStep => "two_step",
        }
    }
}

/// The editable monetary and policy parameters.
///
/// Saving a `ConfigValues` through [`super::ConfigStore::save`] produces a new
/// immutable [`ConfigurationSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValues {
    /// Monthly living allowance per degree level (USD/month).
    pub living_allowance_usd: LivingAllowanceRates,
    /// Annual study allowance (USD/year).
    pub study_allowance_usd: Decimal,
    /// One-time excess baggage allowance (USD).
    pub baggage_allowance_usd: Decimal,
    /// Conversion rate from USD to CNY.
    pub fx_rate_usd_to_cny: Decimal,
    /// Pay the entry-year study allowance to students who exit before that October.
    #[serde(default)]
    pub policy_issue_study_if_exit_before_oct_entry_year: bool,
    /// Pay living allowance for the withdrawal month without an explicit selection.
    #[serde(default)]
    pub withdrawn_living_default: bool,
    /// Pay the study allowance to students entering during October itself.
    #[serde(default)]
    pub issue_study_if_entry_in_october: bool,
    /// When prorated amounts are rounded.
    #[serde(default)]
    pub rounding_policy: RoundingPolicy,
}

impl ConfigValues {
    /// Checks that all money fields are non-negative and the FX rate is strictly positive.
    ///
    /// # Example
    ///
    /// ```
    /// use allowance_engine::config::{ConfigValues, LivingAllowanceRates, RoundingPolicy};
    /// use rust_decimal::Decimal;
    ///
    /// let mut values = ConfigValues {
    ///     living_allowance_usd: LivingAllowanceRates {
    ///         bachelor: Decimal::from(300),
    ///         master: Decimal::from(350),
    ///         phd: Decimal::from(400),
    ///     },
    ///     study_allowance_usd: Decimal::from(800),
    ///     baggage_allowance_usd: Decimal::from(1200),
    ///     fx_rate_usd_to_cny: Decimal::new(710, 2),
    ///     policy_issue_study_if_exit_before_oct_entry_year: false,
    ///     withdrawn_living_default: false,
    ///     issue_study_if_entry_in_october: false,
    ///     rounding_policy: RoundingPolicy::FinalOnly,
    /// };
    /// assert!(values.validate().is_ok());
    ///
    /// values.fx_rate_usd_to_cny = Decimal::ZERO;
    /// assert!(values.validate().is_err());
    /// ```
    pub fn validate(&self) -> EngineResult<()> {
        let money_fields = [
            ("living_allowance_usd.bachelor", self.living_allowance_usd.bachelor),
            ("living_allowance_usd.master", self.living_allowance_usd.master),
            ("living_allowance_usd.phd", self.living_allowance_usd.phd),
            ("study_allowance_usd", self.study_allowance_usd),
            ("baggage_allowance_usd", self.baggage_allowance_usd),
        ];

        for (field, value) in money_fields {
            if value < Decimal::ZERO {
                return Err(EngineError::InvalidConfig {
                    field: field.to_string(),
                    message: format!("must be non-negative, got {}", value),
                });
            }
        }

        if self.fx_rate_usd_to_cny <= Decimal::ZERO {
            return Err(EngineError::InvalidConfig {
                field: "fx_rate_usd_to_cny".to_string(),
                message: format!("must be strictly positive, got {}", self.fx_rate_usd_to_cny),
            });
        }

        Ok(())
    }
}

/// An immutable, versioned bundle of configuration values.
///
/// Snapshots are created by saving [`ConfigValues`] and are never mutated;
/// each run records the version it used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    values: ConfigValues,
}

impl ConfigurationSnapshot {
    /// Creates a snapshot after validating its values.
    pub fn new(version: u32, values: ConfigValues) -> EngineResult<Self> {
        values.validate()?;
        Ok(Self {
            version,
            saved_at: Utc::now(),
            values,
        })
    }

    /// The snapshot version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// When the snapshot was saved.
    pub fn saved_at(&self) -> DateTime<Utc> {
        self.saved_at
    }

    /// The underlying values.
    pub fn values(&self) -> &ConfigValues {
        &self.values
    }

    /// Monthly living allowance for a degree level (USD).
    pub fn living_rate(&self, degree_level: DegreeLevel) -> Decimal {
        self.values.living_allowance_usd.for_degree(degree_level)
    }

    /// Annual study allowance (USD).
    pub fn study_allowance_usd(&self) -> Decimal {
        self.values.study_allowance_usd
    }

    /// One-time baggage allowance (USD).
    pub fn baggage_allowance_usd(&self) -> Decimal {
        self.values.baggage_allowance_usd
    }

    /// USD to CNY conversion rate.
    pub fn fx_rate(&self) -> Decimal {
        self.values.fx_rate_usd_to_cny
    }

    /// Rounding policy for prorated amounts.
    pub fn rounding_policy(&self) -> RoundingPolicy {
        self.values.rounding_policy
    }
}
