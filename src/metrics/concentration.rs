use crate::core::entity::EntityId;
use crate::core::money;
use crate::core::transaction::Transaction;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an entity's transaction volume is spread over its counterparties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    /// HHI over volume in both directions.
    pub hhi: f64,
    /// HHI over outgoing payments only.
    pub payment_hhi: f64,
    /// HHI over incoming receipts only.
    pub receipt_hhi: f64,
    /// Distinct counterparties in either direction.
    pub counterparties: usize,
    pub transactions: usize,
    /// Total volume paid plus received.
    pub volume: Decimal,
}

impl Concentration {
    /// Mean of the payment and receipt indices.
    pub fn directional_mean(&self) -> f64 {
        (self.payment_hhi + self.receipt_hhi) / 2.0
    }
}

/// Herfindahl-Hirschman index of a volume distribution: `sum(share_i^2)`.
///
/// Zero total volume means no concentration, so the index is 0.
///
/// ```
/// use cnpj_insight::metrics::concentration::hhi;
/// use rust_decimal_macros::dec;
///
/// assert!((hhi([dec!(50), dec!(30), dec!(20)]) - 0.38).abs() < 1e-12);
/// assert_eq!(hhi([dec!(10)]), 1.0);
/// assert_eq!(hhi(Vec::new()), 0.0);
/// ```
pub fn hhi<I: IntoIterator<Item = Decimal>>(volumes: I) -> f64 {
    let volumes: Vec<Decimal> = volumes.into_iter().collect();
    let total = money::total(volumes.iter().copied());
    if total <= Decimal::ZERO {
        return 0.0;
    }
    let index = money::total(volumes.iter().map(|v| {
        let share = v.checked_div(total).unwrap_or(Decimal::MAX);
        share.saturating_mul(share)
    }));
    index.to_f64().unwrap_or_default().clamp(0.0, 1.0)
}

/// Concentration of `entity` over the given transactions.
///
/// Transactions that do not involve `entity` are ignored.
pub fn concentration(entity: &EntityId, transactions: &[&Transaction]) -> Concentration {
    let mut both: BTreeMap<&EntityId, Decimal> = BTreeMap::new();
    let mut paid: BTreeMap<&EntityId, Decimal> = BTreeMap::new();
    let mut received: BTreeMap<&EntityId, Decimal> = BTreeMap::new();
    let mut count = 0;

    for tx in transactions {
        let Some(counterparty) = tx.counterparty_of(entity) else {
            continue;
        };
        count += 1;
        let slot = both.entry(counterparty).or_insert(Decimal::ZERO);
        *slot = slot.saturating_add(tx.amount());
        let side = if tx.payer() == entity {
            &mut paid
        } else {
            &mut received
        };
        let slot = side.entry(counterparty).or_insert(Decimal::ZERO);
        *slot = slot.saturating_add(tx.amount());
    }

    Concentration {
        hhi: hhi(both.values().copied()),
        payment_hhi: hhi(paid.values().copied()),
        receipt_hhi: hhi(received.values().copied()),
        counterparties: both.len(),
        transactions: count,
        volume: money::total(both.values().copied()),
    }
}
