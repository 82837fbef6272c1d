use crate::core::entity::EntityId;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Settlement rail of a transaction (`DS_TRAN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Pix,
    Ted,
    Boleto,
    Sistemico,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 4] = [
        TransactionKind::Pix,
        TransactionKind::Ted,
        TransactionKind::Boleto,
        TransactionKind::Sistemico,
    ];

    /// Label as written in the `DS_TRAN` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Pix => "PIX",
            TransactionKind::Ted => "TED",
            TransactionKind::Boleto => "BOLETO",
            TransactionKind::Sistemico => "SISTEMICO",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PIX" => Ok(TransactionKind::Pix),
            "TED" => Ok(TransactionKind::Ted),
            "BOLETO" => Ok(TransactionKind::Boleto),
            "SISTEMICO" | "SISTÊMICO" => Ok(TransactionKind::Sistemico),
            other => Err(other.to_string()),
        }
    }
}

/// A transfer of money from `payer` to `payee`.
///
/// Transactions are immutable once loaded. The amount is never negative;
/// that is checked when the row is validated.
///
/// # Examples
///
/// ```
/// use cnpj_insight::core::entity::EntityId;
/// use cnpj_insight::core::transaction::{Transaction, TransactionKind};
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let tx = Transaction::new(
///     EntityId::new("A"),
///     EntityId::new("B"),
///     dec!(1500.00),
///     NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
///     TransactionKind::Pix,
/// );
/// assert!(tx.involves(&EntityId::new("B")));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    id: Uuid,
    payer: EntityId,
    payee: EntityId,
    amount: Decimal,
    date: NaiveDate,
    kind: TransactionKind,
}

impl Transaction {
    /// Create a transaction with a fresh random ID.
    pub fn new(
        payer: EntityId,
        payee: EntityId,
        amount: Decimal,
        date: NaiveDate,
        kind: TransactionKind,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), payer, payee, amount, date, kind)
    }

    /// Create a transaction with a specific ID (useful for testing / determinism).
    pub fn with_id(
        id: Uuid,
        payer: EntityId,
        payee: EntityId,
        amount: Decimal,
        date: NaiveDate,
        kind: TransactionKind,
    ) -> Self {
        Self {
            id,
            payer,
            payee,
            amount,
            date,
            kind,
        }
    }

    /// Unique ID assigned at load time.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Entity the money leaves.
    pub fn payer(&self) -> &EntityId {
        &self.payer
    }

    /// Entity the money goes to.
    pub fn payee(&self) -> &EntityId {
        &self.payee
    }

    /// Amount transferred, never negative.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Settlement date.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Settlement rail.
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// True when `entity` is the payer or the payee.
    pub fn involves(&self, entity: &EntityId) -> bool {
        &self.payer == entity || &self.payee == entity
    }

    /// The other side of the transaction as seen from `entity`.
    pub fn counterparty_of(&self, entity: &EntityId) -> Option<&EntityId> {
        if &self.payer == entity {
            Some(&self.payee)
        } else if &self.payee == entity {
            Some(&self.payer)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("pix".parse::<TransactionKind>(), Ok(TransactionKind::Pix));
        assert_eq!(" TED ".parse::<TransactionKind>(), Ok(TransactionKind::Ted));
        assert_eq!(
            "Sistêmico".parse::<TransactionKind>(),
            Ok(TransactionKind::Sistemico)
        );
        assert!("DOC".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_counterparty() {
        let a = EntityId::new("A");
        let b = EntityId::new("B");
        let tx = Transaction::new(a.clone(), b.clone(), dec!(10), date(), TransactionKind::Ted);
        assert_eq!(tx.counterparty_of(&a), Some(&b));
        assert_eq!(tx.counterparty_of(&b), Some(&a));
        assert_eq!(tx.counterparty_of(&EntityId::new("C")), None);
    }
}
