//! CSV export of settlement line items.
//!
//! One row per line item, in the order the run returned them. Money columns
//! are fixed two-decimal strings; metadata is flattened to `key=value|key=value`.

use std::io::Write;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::calculation::round_half_up;
use crate::error::{EngineError, EngineResult};
use crate::models::{AllowanceLineItem, SettlementRun};

/// Header row written by [`write_csv`].
pub const EXPORT_COLUMNS: [&str; 12] = [
    "run_id",
    "settlement_month",
    "student_id",
    "allowance_type",
    "period_start",
    "period_end",
    "amount_usd",
    "fx_rate",
    "amount_cny",
    "rule_id",
    "description",
    "metadata",
];

/// One exported line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    /// Owning run.
    pub run_id: String,
    /// Settled month, `YYYY-MM`.
    pub settlement_month: String,
    /// Paid student.
    pub student_id: String,
    /// Allowance type label.
    pub allowance_type: String,
    /// Period start, `YYYY-MM-DD`.
    pub period_start: String,
    /// Period end, `YYYY-MM-DD`.
    pub period_end: String,
    /// USD amount with two decimals.
    pub amount_usd: String,
    /// FX rate as configured.
    pub fx_rate: String,
    /// CNY amount with two decimals.
    pub amount_cny: String,
    /// Deciding rule branch.
    pub rule_id: String,
    /// Human-readable description.
    pub description: String,
    /// Flattened metadata.
    pub metadata: String,
}

impl ExportRow {
    /// Builds the export row for a line item.
    pub fn from_item(item: &AllowanceLineItem) -> Self {
        let mut metadata: Vec<String> = item
            .metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if item.amount_usd.scale() > 2 {
            metadata.push(format!("amount_usd_exact={}", item.amount_usd));
        }

        Self {
            run_id: item.run_id.to_string(),
            settlement_month: item.settlement_month.to_string(),
            student_id: item.student_id.clone(),
            allowance_type: item.allowance_type.to_string(),
            period_start: item.period_start.to_string(),
            period_end: item.period_end.to_string(),
            amount_usd: fixed_2dp(item.amount_usd),
            fx_rate: item.fx_rate.to_string(),
            amount_cny: fixed_2dp(item.amount_cny),
            rule_id: item.rule_id.clone(),
            description: item.description.clone(),
            metadata: metadata.join("|"),
        }
    }
}

/// Formats a decimal with exactly two places, rounding half-up.
pub fn fixed_2dp(value: Decimal) -> String {
    let mut rounded = round_half_up(value, 2);
    rounded.rescale(2);
    rounded.to_string()
}

/// Writes a run's line items as CSV, header first.
///
/// Items belonging to a different run are rejected before anything is written.
pub fn write_csv<W: Write>(writer: W, run: &SettlementRun, items: &[AllowanceLineItem]) -> EngineResult<()> {
    if let Some(stray) = items.iter().find(|i| i.run_id != run.run_id) {
        return Err(EngineError::PersistenceError {
            message: format!(
                "line item for {} belongs to run {}, not {}",
                stray.student_id, stray.run_id, run.run_id
            ),
        });
    }

    let write_error = |e: csv::Error| EngineError::PersistenceError {
        message: format!("failed to write CSV export: {}", e),
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(EXPORT_COLUMNS).map_err(write_error)?;
    for item in items {
        csv_writer
            .serialize(ExportRow::from_item(item))
            .map_err(write_error)?;
    }
    csv_writer
        .flush()
        .map_err(|e| EngineError::PersistenceError {
            message: format!("failed to flush CSV export: {}", e),
        })
}
