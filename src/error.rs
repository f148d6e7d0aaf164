//! Error types for the allowance settlement engine.
//!
//! This module provides strongly-typed errors using the `thiserror` crate
//! for all error conditions that can occur while evaluating allowance rules
//! and orchestrating settlement runs.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::AllowanceType;

/// The main error type for the allowance settlement engine.
///
/// All operations in the engine return this error type, making it easy
/// to handle errors consistently throughout the application.
///
/// # Example
///
/// ```
/// use allowance_engine::error::EngineError;
///
/// let error = EngineError::ConfigNotFound {
///     path: "/missing/allowances.yaml".to_string(),
/// };
/// assert_eq!(
///     error.to_string(),
///     "Configuration file not found: /missing/allowances.yaml"
/// );
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    /// A calendar value was malformed or impossible.
    #[error("Invalid date '{value}': {message}")]
    InvalidDate {
        /// The offending input, as received.
        value: String,
        /// Why the value was rejected.
        message: String,
    },

    /// A configuration value was non-numeric or out of range.
    #[error("Invalid configuration field '{field}': {message}")]
    InvalidConfig {
        /// The configuration field that was rejected.
        field: String,
        /// A description of what made the field invalid.
        message: String,
    },

    /// A settlement was attempted before any configuration was saved.
    #[error("No configuration has been saved")]
    NoConfig,

    /// A student record was missing a field or violated a status/date invariant.
    #[error("Invalid student '{student_id}' field '{field}': {message}")]
    InvalidStudent {
        /// The ID of the offending student.
        student_id: String,
        /// The field that was invalid.
        field: String,
        /// A description of what made the field invalid.
        message: String,
    },

    /// An equivalent line item already exists in a persisted run.
    ///
    /// The orchestrator converts this into a run warning; it never fails a run.
    #[error(
        "Duplicate {allowance_type} line item for student '{student_id}' \
         ({period_start} to {period_end})"
    )]
    DuplicateLineItem {
        /// The student the item was proposed for.
        student_id: String,
        /// The allowance type of the proposed item.
        allowance_type: AllowanceType,
        /// Start of the proposed item's period.
        period_start: NaiveDate,
        /// End of the proposed item's period.
        period_end: NaiveDate,
    },

    /// A settlement run was aborted; nothing was persisted.
    #[error("Settlement run for {settlement_month} failed: {source}")]
    RunFailed {
        /// The month the run was computing.
        settlement_month: String,
        /// The first error encountered during evaluation.
        #[source]
        source: Box<EngineError>,
    },

    /// Configuration file was not found at the specified path.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration file '{path}': {message}")]
    ConfigParseError {
        /// The path to the file that failed to parse.
        path: String,
        /// A description of the parse error.
        message: String,
    },

    /// A student CSV row could not be read.
    #[error("Failed to import row {row}: {message}")]
    ImportError {
        /// The 1-based data row number (header excluded).
        row: usize,
        /// A description of the problem.
        message: String,
    },

    /// The settlement store refused or failed a write.
    #[error("Persistence error: {message}")]
    PersistenceError {
        /// A description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Wraps an evaluation error into a [`EngineError::RunFailed`] for the given month.
    pub fn run_failed(settlement_month: impl Into<String>, source: EngineError) -> Self {
        EngineError::RunFailed {
            settlement_month: settlement_month.into(),
            source: Box::new(source),
        }
    }

    /// Shorthand for an [`EngineError::InvalidStudent`].
    pub fn invalid_student(
        student_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        EngineError::InvalidStudent {
            student_id: student_id.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A type alias for Results that return EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
