//! Settlement summaries.
//!
//! Aggregates line items into USD and CNY totals by allowance type, by student
//! and by the calendar year of the paid period.

use std::collections::BTreeMap;

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{AllowanceLineItem, AllowanceType};

/// A USD and CNY amount pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Sum in USD.
    pub usd: Decimal,
    /// Sum in CNY.
    pub cny: Decimal,
}

impl Totals {
    fn add(&mut self, item: &AllowanceLineItem) {
        self.usd += item.amount_usd;
        self.cny += item.amount_cny;
    }
}

/// Totals for one group, broken down by allowance type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupTotals {
    /// Per-type totals. Types with no items are absent.
    pub by_type: BTreeMap<AllowanceType, Totals>,
    /// Sum across all types.
    pub total: Totals,
}

impl GroupTotals {
    fn add(&mut self, item: &AllowanceLineItem) {
        self.by_type.entry(item.allowance_type).or_default().add(item);
        self.total.add(item);
    }

    /// Totals for one allowance type, zero if none were paid.
    pub fn for_type(&self, allowance_type: AllowanceType) -> Totals {
        self.by_type.get(&allowance_type).copied().unwrap_or_default()
    }
}

/// Aggregated view over a set of line items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementSummary {
    /// Totals per allowance type.
    pub by_type: BTreeMap<AllowanceType, Totals>,
    /// Totals per student, keyed by `student_id`.
    pub by_student: BTreeMap<String, GroupTotals>,
    /// Totals per calendar year of `period_start`.
    pub by_year: BTreeMap<i32, GroupTotals>,
    /// Grand totals.
    pub grand_total: Totals,
    /// Number of items summarized.
    pub item_count: usize,
}

/// Summarizes line items.
///
/// # Example
///
/// ```
/// use allowance_engine::report::summarize;
///
/// let summary = summarize(&[]);
/// assert_eq!(summary.item_count, 0);
/// assert!(summary.by_student.is_empty());
/// ```
pub fn summarize(items: &[AllowanceLineItem]) -> SettlementSummary {
    let mut summary = SettlementSummary::default();

    for item in items {
        summary.by_type.entry(item.allowance_type).or_default().add(item);
        summary
            .by_student
            .entry(item.student_id.clone())
            .or_default()
            .add(item);
        summary
            .by_year
            .entry(item.period_start.year())
            .or_default()
            .add(item);
        summary.grand_total.add(item);
        summary.item_count += 1;
    }

    summary
}
