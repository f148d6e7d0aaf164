//! Currency conversion and rounding.
//!
//! Allowances are computed in USD and converted to CNY as the last step.
//! Rounding is half-up: a midpoint always moves away from zero, never to the
//! nearest even digit.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::{ConfigurationSnapshot, RoundingPolicy};

/// Decimal places kept on settlement-currency amounts.
pub const CNY_DECIMAL_PLACES: u32 = 2;

/// Decimal places used when the two-step policy rounds USD first.
pub const USD_DECIMAL_PLACES: u32 = 2;

/// A USD amount and its settlement-currency equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertedAmount {
    /// Amount in USD as recorded on the line item.
    pub amount_usd: Decimal,
    /// The rate applied.
    pub fx_rate: Decimal,
    /// Amount in CNY, rounded half-up to 2 decimal places.
    pub amount_cny: Decimal,
}

/// Rounds `value` to `decimal_places` using round-half-up.
///
/// # Examples
///
/// ```
/// use allowance_engine::calculation::round_half_up;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let value = Decimal::from_str("123.455").unwrap();
/// assert_eq!(round_half_up(value, 2), Decimal::from_str("123.46").unwrap());
///
/// let value = Decimal::from_str("0.125").unwrap();
/// assert_eq!(round_half_up(value, 2), Decimal::from_str("0.13").unwrap());
/// ```
pub fn round_half_up(value: Decimal, decimal_places: u32) -> Decimal {
    value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a USD amount to CNY and rounds the result.
pub fn convert_usd_to_cny(amount_usd: Decimal, fx_rate: Decimal) -> Decimal {
    round_half_up(amount_usd * fx_rate, CNY_DECIMAL_PLACES)
}

/// Converts a rule's USD amount using the snapshot's rate and rounding policy.
///
/// `prorated` marks amounts derived from a day fraction; only those are
/// pre-rounded under [`RoundingPolicy::TwoStep`]. Fixed amounts are converted
/// unchanged under either policy.
pub fn convert(amount_usd: Decimal, prorated: bool, config: &ConfigurationSnapshot) -> ConvertedAmount {
    let amount_usd = match config.rounding_policy() {
        RoundingPolicy::TwoStep if prorated => round_half_up(amount_usd, USD_DECIMAL_PLACES),
        _ => amount_usd,
    };
    let fx_rate = config.fx_rate();

    ConvertedAmount {
        amount_usd,
        fx_rate,
        amount_cny: convert_usd_to_cny(amount_usd, fx_rate),
    }
}
