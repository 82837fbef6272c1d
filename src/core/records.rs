use crate::core::entity::{EntityId, Month, SectorCode};
use crate::core::transaction::TransactionKind;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One validated row of the company dataset.
///
/// Fields have already been parsed; the [`EntityStore`](crate::core::store::EntityStore)
/// only checks cross-row consistency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: EntityId,
    pub month: Month,
    pub revenue: Decimal,
    pub balance: Decimal,
    pub sector: SectorCode,
}

impl CompanyRecord {
    pub fn new(
        id: impl Into<EntityId>,
        month: Month,
        revenue: Decimal,
        balance: Decimal,
        sector: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            month,
            revenue,
            balance,
            sector: SectorCode::new(sector),
        }
    }
}

/// One validated row of the transaction dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub payer: EntityId,
    pub payee: EntityId,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub kind: TransactionKind,
}

impl TransactionRecord {
    pub fn new(
        payer: impl Into<EntityId>,
        payee: impl Into<EntityId>,
        amount: Decimal,
        date: NaiveDate,
        kind: TransactionKind,
    ) -> Self {
        Self {
            payer: payer.into(),
            payee: payee.into(),
            amount,
            date,
            kind,
        }
    }
}
