//! Core data models for the allowance settlement engine.
//!
//! This module contains all the domain models used throughout the engine.

mod line_item;
mod settlement_month;
mod settlement_run;
mod student;

pub use line_item::{AllowanceLine, AllowanceLineItem, AllowanceType, LineItemKey};
pub use settlement_month::SettlementMonth;
pub use settlement_run::{
    AuditStep, AuditTrace, AuditWarning, RunStatus, SettlementOutcome, SettlementRun,
};
pub use student::{DegreeLevel, Student, StudentStatus};
