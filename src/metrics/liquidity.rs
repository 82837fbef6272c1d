use crate::core::error::InsufficientDataError;
use crate::core::money;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runway below this many months raises a [`RiskAlert::ShortRunway`].
pub const SHORT_RUNWAY_MONTHS: u64 = 3;

/// A balance drop larger than this share of revenue raises a
/// [`RiskAlert::SharpDecline`].
pub const SHARP_DECLINE_REVENUE_SHARE: Decimal = dec!(0.1);

/// Projected months until the balance reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runway {
    /// Whole months left at the current burn rate.
    Months(u64),
    /// The balance is not decreasing.
    Infinite,
}

impl Runway {
    pub fn months(&self) -> Option<u64> {
        match self {
            Runway::Months(m) => Some(*m),
            Runway::Infinite => None,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Runway::Infinite)
    }

    /// True when the runway is strictly longer than `months`.
    pub fn exceeds(&self, months: u64) -> bool {
        match self {
            Runway::Months(m) => *m > months,
            Runway::Infinite => true,
        }
    }
}

impl fmt::Display for Runway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runway::Months(1) => write!(f, "1 month"),
            Runway::Months(m) => write!(f, "{} months", m),
            Runway::Infinite => write!(f, "infinite (balance not decreasing)"),
        }
    }
}

/// Average month-over-month balance change.
///
/// Negative when the balance is shrinking. The average of the deltas
/// telescopes to `(last - first) / (n - 1)`.
///
/// ```
/// use cnpj_insight::metrics::liquidity::burn_rate;
/// use rust_decimal_macros::dec;
///
/// let balances = [dec!(100), dec!(80), dec!(60), dec!(40), dec!(20)];
/// assert_eq!(burn_rate(&balances).unwrap(), dec!(-20));
/// assert!(burn_rate(&balances[..1]).is_err());
/// ```
pub fn burn_rate(balances: &[Decimal]) -> Result<Decimal, InsufficientDataError> {
    match (balances.first(), balances.last()) {
        (Some(first), Some(last)) if balances.len() >= 2 => {
            Ok(last.saturating_sub(*first) / Decimal::from(balances.len() - 1))
        }
        _ => Err(InsufficientDataError::new("burn rate", 2, balances.len())),
    }
}

/// Average size of the months in which the balance fell: the absolute
/// mean of the negative month-over-month deltas, zero when it never fell.
///
/// Unlike [`burn_rate`], months of growth do not offset the drops.
///
/// ```
/// use cnpj_insight::metrics::liquidity::mean_outflow;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(mean_outflow(&[dec!(100), dec!(50), dec!(150)]).unwrap(), dec!(50));
/// assert_eq!(mean_outflow(&[dec!(10), dec!(20)]).unwrap(), dec!(0));
/// ```
pub fn mean_outflow(balances: &[Decimal]) -> Result<Decimal, InsufficientDataError> {
    if balances.len() < 2 {
        return Err(InsufficientDataError::new("outflow", 2, balances.len()));
    }
    let drops: Vec<Decimal> = balances
        .windows(2)
        .map(|pair| pair[1].saturating_sub(pair[0]))
        .filter(|delta| delta.is_sign_negative() && !delta.is_zero())
        .collect();
    Ok(money::mean(&drops).abs())
}

/// Months of runway left for `current_balance` at `burn_rate`.
///
/// A non-negative burn rate never exhausts the balance, so the runway is
/// [`Runway::Infinite`]. A balance already at or below zero has no runway.
pub fn runway(current_balance: Decimal, burn_rate: Decimal) -> Runway {
    if burn_rate >= Decimal::ZERO {
        return Runway::Infinite;
    }
    if current_balance <= Decimal::ZERO {
        return Runway::Months(0);
    }
    // A burn too small to divide by leaves more months than u64 holds.
    let months = current_balance
        .checked_div(burn_rate.abs())
        .and_then(|m| m.floor().to_u64())
        .unwrap_or(u64::MAX);
    Runway::Months(months)
}

/// Coefficient of variation of the balance series: sample standard
/// deviation over the absolute mean. A zero mean yields 1.0.
pub fn balance_cv(balances: &[Decimal]) -> Result<f64, InsufficientDataError> {
    if balances.len() < 2 {
        return Err(InsufficientDataError::new(
            "balance stability",
            2,
            balances.len(),
        ));
    }
    let values: Vec<f64> = balances
        .iter()
        .map(|b| b.to_f64().unwrap_or_default())
        .collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return Ok(1.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Ok(variance.sqrt() / mean.abs())
}

/// Change between the first and the last balance.
pub fn balance_variation(balances: &[Decimal]) -> Result<Decimal, InsufficientDataError> {
    match (balances.first(), balances.last()) {
        (Some(first), Some(last)) if balances.len() >= 2 => Ok(last.saturating_sub(*first)),
        _ => Err(InsufficientDataError::new(
            "balance variation",
            2,
            balances.len(),
        )),
    }
}

/// Mean of the absolute balances, used to normalize the burn rate.
pub fn mean_abs_balance(balances: &[Decimal]) -> Decimal {
    let magnitudes: Vec<Decimal> = balances.iter().map(|b| b.abs()).collect();
    money::mean(&magnitudes)
}

/// Liquidity warnings for a single entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAlert {
    NegativeBalance,
    ShortRunway,
    SharpDecline,
}

impl fmt::Display for RiskAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskAlert::NegativeBalance => write!(f, "negative balance"),
            RiskAlert::ShortRunway => {
                write!(f, "runway below {} months", SHORT_RUNWAY_MONTHS)
            }
            RiskAlert::SharpDecline => write!(f, "balance drop above 10% of revenue"),
        }
    }
}

/// Alerts raised by the current balance, runway and balance variation.
/// Missing inputs raise nothing.
pub fn risk_alerts(
    current_balance: Option<Decimal>,
    runway: Option<Runway>,
    variation: Option<Decimal>,
    revenue: Option<Decimal>,
) -> Vec<RiskAlert> {
    let mut alerts = Vec::new();
    if current_balance.is_some_and(|b| b < Decimal::ZERO) {
        alerts.push(RiskAlert::NegativeBalance);
    }
    if let Some(Runway::Months(m)) = runway {
        if m < SHORT_RUNWAY_MONTHS {
            alerts.push(RiskAlert::ShortRunway);
        }
    }
    if let (Some(variation), Some(revenue)) = (variation, revenue) {
        if variation < -(revenue.saturating_mul(SHARP_DECLINE_REVENUE_SHARE)) {
            alerts.push(RiskAlert::SharpDecline);
        }
    }
    alerts
}
