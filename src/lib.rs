//! Allowance settlement engine for foreign students
//!
//! This crate computes the monthly living allowance, the annual study allowance
//! and the one-time excess baggage allowance owed to foreign students, converts
//! them from USD to CNY, and records each settlement run with per-line rule
//! attribution and an audit trace.

#![warn(missing_docs)]

pub mod calculation;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod report;
pub mod settlement;
