//! Decimal totals that never panic on overflow.
//!
//! [`EntityStore`](crate::core::store::EntityStore) rejects datasets whose
//! amounts cannot be summed, so inside a loaded store these helpers never
//! saturate. They keep the metric and graph functions total for callers
//! that build transactions by hand.

use rust_decimal::Decimal;

/// Sum that saturates at the `Decimal` bounds.
///
/// ```
/// use cnpj_insight::core::money::total;
/// use rust_decimal::Decimal;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(total([dec!(1.5), dec!(2)]), dec!(3.5));
/// assert_eq!(total([Decimal::MAX, dec!(1)]), Decimal::MAX);
/// ```
pub fn total<I: IntoIterator<Item = Decimal>>(values: I) -> Decimal {
    values
        .into_iter()
        .fold(Decimal::ZERO, |acc, v| acc.saturating_add(v))
}

/// Sum, or `None` when it leaves the `Decimal` range.
pub fn checked_total<I: IntoIterator<Item = Decimal>>(values: I) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// Mean of `values`, saturating; zero for an empty slice.
pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    total(values.iter().copied()) / Decimal::from(values.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_checked_total_reports_overflow() {
        let big = dec!(50000000000000000000000000000);
        assert_eq!(checked_total([big]), Some(big));
        assert_eq!(checked_total([big, big]), None);
        assert_eq!(checked_total(Vec::new()), Some(Decimal::ZERO));
    }

    #[test]
    fn test_total_saturates_both_ways() {
        assert_eq!(total([Decimal::MIN, dec!(-1)]), Decimal::MIN);
        assert_eq!(total([Decimal::MAX, Decimal::MAX]), Decimal::MAX);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[dec!(10), dec!(20)]), dec!(15));
        assert_eq!(mean(&[]), Decimal::ZERO);
    }
}
