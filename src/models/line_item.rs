//! Allowance line item models.
//!
//! An [`AllowanceLine`] is what a rule proposes for one student and period; an
//! [`AllowanceLineItem`] is the same line once accepted into a settlement run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SettlementMonth;

/// The kind of allowance a line item pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AllowanceType {
    /// Monthly living allowance.
    Living,
    /// Annual study allowance, paid in October.
    Study,
    /// One-time post-graduation baggage allowance.
    ExcessBaggage,
}

impl AllowanceType {
    /// All allowance types, in report order.
    pub const ALL: [AllowanceType; 3] = [
        AllowanceType::Living,
        AllowanceType::Study,
        AllowanceType::ExcessBaggage,
    ];
}

impl fmt::Display for AllowanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AllowanceType::Living => "Living",
            AllowanceType::Study => "Study",
            AllowanceType::ExcessBaggage => "ExcessBaggage",
        };
        f.write_str(label)
    }
}

/// Identity of a payment for duplicate prevention: who, what, and for which period.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineItemKey {
    /// The paid student.
    pub student_id: String,
    /// The allowance paid.
    pub allowance_type: AllowanceType,
    /// Start of the paid period (inclusive).
    pub period_start: NaiveDate,
    /// End of the paid period (inclusive).
    pub period_end: NaiveDate,
}

/// A line proposed by an allowance rule, before it belongs to a run.
///
/// # Example
///
/// ```
/// use allowance_engine::models::{AllowanceLine, AllowanceType};
/// use chrono::NaiveDate;
/// use rust_decimal::Decimal;
/// use std::collections::BTreeMap;
/// use std::str::FromStr;
///
/// let line = AllowanceLine {
///     student_id: "S001".to_string(),
///     allowance_type: AllowanceType::Living,
///     period_start: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
///     period_end: NaiveDate::from_ymd_opt(2024, 10, 31).unwrap(),
///     amount_usd: Decimal::from(500),
///     fx_rate: Decimal::from_str("7.20").unwrap(),
///     amount_cny: Decimal::from_str("3600.00").unwrap(),
///     rule_id: "living_full_month".to_string(),
///     description: "Full monthly living allowance".to_string(),
///     metadata: BTreeMap::new(),
/// };
/// assert_eq!(line.key().period_end.to_string(), "2024-10-31");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceLine {
    /// The student this line pays.
    pub student_id: String,
    /// The allowance this line pays.
    pub allowance_type: AllowanceType,
    /// Start of the covered period (inclusive).
    pub period_start: NaiveDate,
    /// End of the covered period (inclusive).
    pub period_end: NaiveDate,
    /// Amount in the base currency.
    pub amount_usd: Decimal,
    /// The USD to CNY rate applied.
    pub fx_rate: Decimal,
    /// Amount in the settlement currency, rounded to 2 decimal places.
    pub amount_cny: Decimal,
    /// The rule branch that produced this line.
    pub rule_id: String,
    /// Human-readable description.
    pub description: String,
    /// Inputs needed to recompute `amount_usd`.
    pub metadata: BTreeMap<String, String>,
}

impl AllowanceLine {
    /// Returns the duplicate-prevention key for this line.
    pub fn key(&self) -> LineItemKey {
        LineItemKey {
            student_id: self.student_id.clone(),
            allowance_type: self.allowance_type,
            period_start: self.period_start,
            period_end: self.period_end,
        }
    }

    /// Attaches this line to a run.
    pub fn into_line_item(self, run_id: Uuid, settlement_month: SettlementMonth) -> AllowanceLineItem {
        AllowanceLineItem {
            run_id,
            settlement_month,
            student_id: self.student_id,
            allowance_type: self.allowance_type,
            period_start: self.period_start,
            period_end: self.period_end,
            amount_usd: self.amount_usd,
            fx_rate: self.fx_rate,
            amount_cny: self.amount_cny,
            rule_id: self.rule_id,
            description: self.description,
            metadata: self.metadata,
        }
    }
}

/// A persisted allowance payment, owned by its run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceLineItem {
    /// The owning run.
    pub run_id: Uuid,
    /// The month of the owning run.
    pub settlement_month: SettlementMonth,
    /// The paid student.
    pub student_id: String,
    /// The allowance paid.
    pub allowance_type: AllowanceType,
    /// Start of the covered period (inclusive).
    pub period_start: NaiveDate,
    /// End of the covered period (inclusive).
    pub period_end: NaiveDate,
    /// Amount in the base currency.
    pub amount_usd: Decimal,
    /// The USD to CNY rate applied.
    pub fx_rate: Decimal,
    /// Amount in the settlement currency, rounded to 2 decimal places.
    pub amount_cny: Decimal,
    /// The rule branch that produced this item.
    pub rule_id: String,
    /// Human-readable description.
    pub description: String,
    /// Inputs needed to recompute `amount_usd`.
    pub metadata: BTreeMap<String, String>,
}

impl AllowanceLineItem {
    /// Returns the duplicate-prevention key for this item.
    pub fn key(&self) -> LineItemKey {
        LineItemKey {
            student_id: self.student_id.clone(),
            allowance_type: self.allowance_type,
            period_start: self.period_start,
            period_end: self.period_end,
        }
    }
}
