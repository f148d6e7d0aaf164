//! Calculation logic for the allowance settlement engine.
//!
//! This module contains the pure functions behind a settlement run: calendar
//! arithmetic, currency conversion with half-up rounding, the paid-item
//! ledger used for duplicate prevention, and one rule per allowance type
//! (living, study and excess baggage).

mod baggage_allowance;
mod calendar;
mod currency;
mod history;
mod living_allowance;
mod study_allowance;

pub use baggage_allowance::{
    BAGGAGE_ALLOWANCE_RULE, BaggageAllowanceResult, RULE_BAGGAGE_ON_GRADUATION,
    calculate_baggage_allowance,
};
pub use calendar::{
    STUDY_ALLOWANCE_MONTH, days_from_date_to_month_end, days_in_month, is_october,
    months_between_inclusive,
};
pub use currency::{
    CNY_DECIMAL_PLACES, ConvertedAmount, USD_DECIMAL_PLACES, convert, convert_usd_to_cny,
    round_half_up,
};
pub use history::{PaidLedger, PaymentHistory};
pub use living_allowance::{
    LIVING_ALLOWANCE_RULE, LivingAllowanceResult, RULE_LIVING_ENTRY_PRORATE,
    RULE_LIVING_FULL_MONTH, RULE_LIVING_WITHDRAWAL_MONTH, RULE_LIVING_WITHDRAWAL_PRORATE,
    calculate_living_allowance,
};
pub use study_allowance::{
    RULE_STUDY_ENTRY_MONTH, RULE_STUDY_ENTRY_YEAR_OVERRIDE, RULE_STUDY_OCTOBER_IN_STUDY,
    STUDY_ALLOWANCE_RULE, StudyAllowanceResult, calculate_study_allowance,
};
