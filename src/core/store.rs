use crate::core::entity::{Entity, EntityId, Month, ReportingWindow, SectorCode, Snapshot};
use crate::core::error::{DataIntegrityError, NotFoundError};
use crate::core::records::{CompanyRecord, TransactionRecord};
use crate::core::transaction::Transaction;
use crate::metrics::engine::{MetricSet, MetricsEngine};
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::OnceLock;

/// In-memory store of client companies and their transactions.
///
/// The store is read-only once loaded. Each entity owns a metric cache
/// slot that is filled on first access; replacing the dataset with
/// [`EntityStore::reload`] drops every cached metric set.
///
/// Loading rejects datasets whose revenues, balances or transaction
/// amounts cannot be summed within the `Decimal` range, so every total
/// derived from a loaded store is exact.
///
/// # Examples
///
/// ```
/// use cnpj_insight::core::entity::Month;
/// use cnpj_insight::core::records::CompanyRecord;
/// use cnpj_insight::core::store::EntityStore;
/// use rust_decimal_macros::dec;
///
/// let jan = Month::new(2025, 1).unwrap();
/// let feb = jan.succ();
/// let store = EntityStore::load(
///     vec![
///         CompanyRecord::new("A", jan, dec!(1000), dec!(100), "Varejo"),
///         CompanyRecord::new("A", feb, dec!(1000), dec!(80), "Varejo"),
///     ],
///     vec![],
/// )
/// .unwrap();
///
/// let metrics = store.metrics(&"A".into()).unwrap();
/// assert_eq!(metrics.burn_rate, Some(dec!(-20)));
/// ```
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: Vec<Entity>,
    index: HashMap<EntityId, usize>,
    transactions: Vec<Transaction>,
    /// Entity position -> positions of the transactions it takes part in.
    involvement: Vec<Vec<usize>>,
    window: Option<ReportingWindow>,
    /// Window passed to [`EntityStore::load_with_window`], kept for reloads.
    declared_window: Option<ReportingWindow>,
    metrics: Vec<OnceLock<MetricSet>>,
}

impl EntityStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load validated rows, inferring the reporting window from the data.
    pub fn load(
        companies: Vec<CompanyRecord>,
        transactions: Vec<TransactionRecord>,
    ) -> Result<Self, DataIntegrityError> {
        Self::build(companies, transactions, None)
    }

    /// Load validated rows against a declared reporting window.
    pub fn load_with_window(
        companies: Vec<CompanyRecord>,
        transactions: Vec<TransactionRecord>,
        window: ReportingWindow,
    ) -> Result<Self, DataIntegrityError> {
        Self::build(companies, transactions, Some(window))
    }

    /// Replace the dataset. On error the current contents are kept.
    ///
    /// A store loaded with a declared window validates the new rows
    /// against that same window.
    pub fn reload(
        &mut self,
        companies: Vec<CompanyRecord>,
        transactions: Vec<TransactionRecord>,
    ) -> Result<(), DataIntegrityError> {
        let fresh = Self::build(companies, transactions, self.declared_window)?;
        *self = fresh;
        Ok(())
    }

    fn build(
        companies: Vec<CompanyRecord>,
        transactions: Vec<TransactionRecord>,
        declared: Option<ReportingWindow>,
    ) -> Result<Self, DataIntegrityError> {
        // Group rows by entity, keeping the order of first appearance.
        let mut index: HashMap<EntityId, usize> = HashMap::new();
        let mut groups: Vec<(EntityId, SectorCode, Vec<Snapshot>)> = Vec::new();
        let mut revenue_total = Decimal::ZERO;
        let mut balance_total = Decimal::ZERO;
        for (row, record) in companies.into_iter().enumerate() {
            let row = row + 1;
            if record.id.as_str().trim().is_empty() {
                return Err(DataIntegrityError::BlankId {
                    dataset: "company",
                    row,
                });
            }
            revenue_total =
                accumulate(revenue_total, record.revenue.abs(), "company", row, "VL_FATU")?;
            balance_total =
                accumulate(balance_total, record.balance.abs(), "company", row, "VL_SLDO")?;
            let snapshot = Snapshot {
                month: record.month,
                revenue: record.revenue,
                balance: record.balance,
            };
            match index.get(&record.id) {
                Some(&pos) => {
                    let (id, sector, snapshots) = &mut groups[pos];
                    if *sector != record.sector {
                        return Err(DataIntegrityError::SectorMismatch {
                            entity: id.clone(),
                            expected: sector.clone(),
                            found: record.sector,
                        });
                    }
                    snapshots.push(snapshot);
                }
                None => {
                    index.insert(record.id.clone(), groups.len());
                    groups.push((record.id, record.sector, vec![snapshot]));
                }
            }
        }

        let entities: Vec<Entity> = groups
            .into_iter()
            .map(|(id, sector, snapshots)| Entity::new(id, sector, snapshots))
            .collect();

        let window = match declared {
            Some(w) => Some(w),
            None => infer_window(&entities),
        };
        for entity in &entities {
            validate_series(entity, window.as_ref())?;
        }

        let mut involvement = vec![Vec::new(); entities.len()];
        let mut loaded = Vec::with_capacity(transactions.len());
        let mut volume_total = Decimal::ZERO;
        for (row, record) in transactions.into_iter().enumerate() {
            let row = row + 1;
            for id in [&record.payer, &record.payee] {
                if id.as_str().trim().is_empty() {
                    return Err(DataIntegrityError::BlankId {
                        dataset: "transaction",
                        row,
                    });
                }
            }
            let payer_pos = *index.get(&record.payer).ok_or_else(|| {
                DataIntegrityError::UnknownEntity {
                    row,
                    entity: record.payer.clone(),
                }
            })?;
            let payee_pos = *index.get(&record.payee).ok_or_else(|| {
                DataIntegrityError::UnknownEntity {
                    row,
                    entity: record.payee.clone(),
                }
            })?;
            if record.amount < Decimal::ZERO {
                return Err(DataIntegrityError::NegativeAmount {
                    row,
                    amount: record.amount,
                });
            }
            if payer_pos == payee_pos {
                return Err(DataIntegrityError::SelfTransfer {
                    row,
                    entity: record.payer,
                });
            }
            volume_total =
                accumulate(volume_total, record.amount, "transaction", row, "VL")?;

            let position = loaded.len();
            involvement[payer_pos].push(position);
            involvement[payee_pos].push(position);
            loaded.push(Transaction::new(
                record.payer,
                record.payee,
                record.amount,
                record.date,
                record.kind,
            ));
        }

        info!(
            "loaded {} entities and {} transactions{}",
            entities.len(),
            loaded.len(),
            window.map(|w| format!(" ({})", w)).unwrap_or_default()
        );

        let metrics = (0..entities.len()).map(|_| OnceLock::new()).collect();
        Ok(Self {
            entities,
            index,
            transactions: loaded,
            involvement,
            window,
            declared_window: declared,
            metrics,
        })
    }

    /// Look up an entity by id.
    pub fn get(&self, id: &EntityId) -> Result<&Entity, NotFoundError> {
        self.position(id).map(|pos| &self.entities[pos])
    }

    /// True if `id` was loaded.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.index.contains_key(id)
    }

    /// All entities in input order.
    pub fn all(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entity was loaded.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Reporting window, declared or inferred; `None` for an empty store.
    pub fn window(&self) -> Option<ReportingWindow> {
        self.window
    }

    /// All transactions in input order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Transactions where `id` is payer or payee, in input order.
    pub fn transactions_for(&self, id: &EntityId) -> Result<Vec<&Transaction>, NotFoundError> {
        let pos = self.position(id)?;
        Ok(self.involvement[pos]
            .iter()
            .map(|&t| &self.transactions[t])
            .collect())
    }

    /// Metric set of an entity, computed on first access and cached.
    pub fn metrics(&self, id: &EntityId) -> Result<&MetricSet, NotFoundError> {
        let pos = self.position(id)?;
        Ok(self.metrics_at(pos))
    }

    /// `(entity, metrics)` pairs in input order.
    pub fn all_metrics(&self) -> impl Iterator<Item = (&Entity, &MetricSet)> + '_ {
        self.entities
            .iter()
            .enumerate()
            .map(move |(pos, entity)| (entity, self.metrics_at(pos)))
    }

    fn metrics_at(&self, pos: usize) -> &MetricSet {
        self.metrics[pos].get_or_init(|| {
            let entity = &self.entities[pos];
            debug!("computing metrics for {}", entity.id());
            let txs = self.involvement[pos].iter().map(|&t| &self.transactions[t]);
            MetricsEngine::compute(entity, txs)
        })
    }

    fn position(&self, id: &EntityId) -> Result<usize, NotFoundError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| NotFoundError(id.clone()))
    }
}

/// Running total of absolute amounts; overflow means the dataset cannot
/// be aggregated and is rejected.
fn accumulate(
    total: Decimal,
    amount: Decimal,
    dataset: &'static str,
    row: usize,
    column: &'static str,
) -> Result<Decimal, DataIntegrityError> {
    total
        .checked_add(amount)
        .ok_or(DataIntegrityError::AmountOverflow {
            dataset,
            row,
            column,
        })
}

fn infer_window(entities: &[Entity]) -> Option<ReportingWindow> {
    let first = entities.iter().filter_map(Entity::first_month).min()?;
    let last = entities.iter().filter_map(Entity::last_month).max()?;
    Some(ReportingWindow::new(first, last))
}

/// Months must be unique, contiguous, and inside the window.
fn validate_series(
    entity: &Entity,
    window: Option<&ReportingWindow>,
) -> Result<(), DataIntegrityError> {
    let months: Vec<Month> = entity.snapshots().iter().map(|s| s.month).collect();
    if let Some(w) = window {
        if let Some(outside) = months.iter().find(|m| !w.contains(m)) {
            return Err(DataIntegrityError::OutsideWindow {
                entity: entity.id().clone(),
                month: *outside,
                first: w.first,
                last: w.last,
            });
        }
    }
    for pair in months.windows(2) {
        if pair[0] == pair[1] {
            return Err(DataIntegrityError::DuplicateMonth {
                entity: entity.id().clone(),
                month: pair[0],
            });
        }
        if pair[1] != pair[0].succ() {
            return Err(DataIntegrityError::SeriesGap {
                entity: entity.id().clone(),
                missing: pair[0].succ(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::TransactionKind;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn month(m: u32) -> Month {
        Month::new(2025, m).unwrap()
    }

    fn company(id: &str, m: u32, balance: Decimal) -> CompanyRecord {
        CompanyRecord::new(id, month(m), dec!(1000), balance, "Varejo")
    }

    fn tx(from: &str, to: &str, amount: Decimal) -> TransactionRecord {
        TransactionRecord::new(
            from,
            to,
            amount,
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            TransactionKind::Pix,
        )
    }

    #[test]
    fn test_load_keeps_input_order() {
        let store = EntityStore::load(
            vec![
                company("B", 1, dec!(10)),
                company("A", 1, dec!(10)),
                company("B", 2, dec!(10)),
            ],
            vec![tx("A", "B", dec!(5))],
        )
        .unwrap();

        let ids: Vec<&str> = store.all().iter().map(|e| e.id().as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(store.transactions_for(&"A".into()).unwrap().len(), 1);
        assert_eq!(store.window().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let err = EntityStore::load(vec![company("A", 1, dec!(1))], vec![tx("A", "Z", dec!(1))])
            .unwrap_err();
        assert!(matches!(err, DataIntegrityError::UnknownEntity { row: 1, .. }));
    }

    #[test]
    fn test_gap_rejected() {
        let err = EntityStore::load(
            vec![company("A", 1, dec!(1)), company("A", 3, dec!(1))],
            vec![],
        )
        .unwrap_err();
        match err {
            DataIntegrityError::SeriesGap { missing, .. } => assert_eq!(missing, month(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_month_rejected() {
        let err = EntityStore::load(
            vec![company("A", 1, dec!(1)), company("A", 1, dec!(2))],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, DataIntegrityError::DuplicateMonth { .. }));
    }

    #[test]
    fn test_declared_window_enforced() {
        let window = ReportingWindow::new(month(2), month(5));
        let err = EntityStore::load_with_window(vec![company("A", 1, dec!(1))], vec![], window)
            .unwrap_err();
        assert!(matches!(err, DataIntegrityError::OutsideWindow { .. }));
    }

    #[test]
    fn test_negative_and_self_transfer_rejected() {
        let companies = vec![company("A", 1, dec!(1)), company("B", 1, dec!(1))];
        let err = EntityStore::load(companies.clone(), vec![tx("A", "B", dec!(-1))]).unwrap_err();
        assert!(matches!(err, DataIntegrityError::NegativeAmount { .. }));

        let err = EntityStore::load(companies, vec![tx("A", "A", dec!(1))]).unwrap_err();
        assert!(matches!(err, DataIntegrityError::SelfTransfer { .. }));
    }

    #[test]
    fn test_get_unknown() {
        let store = EntityStore::new();
        assert_eq!(
            store.get(&"X".into()).unwrap_err(),
            NotFoundError(EntityId::new("X"))
        );
    }

    #[test]
    fn test_metrics_cached_and_reset_on_reload() {
        let mut store = EntityStore::load(
            vec![company("A", 1, dec!(100)), company("A", 2, dec!(80))],
            vec![],
        )
        .unwrap();
        let first = store.metrics(&"A".into()).unwrap() as *const MetricSet;
        let second = store.metrics(&"A".into()).unwrap() as *const MetricSet;
        assert_eq!(first, second);

        store
            .reload(
                vec![company("A", 1, dec!(100)), company("A", 2, dec!(150))],
                vec![],
            )
            .unwrap();
        assert_eq!(store.metrics(&"A".into()).unwrap().burn_rate, Some(dec!(50)));
    }

    #[test]
    fn test_failed_reload_keeps_previous_store() {
        let mut store = EntityStore::load(vec![company("A", 1, dec!(1))], vec![]).unwrap();
        let result = store.reload(vec![company("B", 1, dec!(1))], vec![tx("B", "Q", dec!(1))]);
        assert!(result.is_err());
        assert!(store.contains(&"A".into()));
        assert!(!store.contains(&"B".into()));
    }

    #[test]
    fn test_store_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EntityStore>();
    }

    #[test]
    fn test_unsummable_amounts_rejected() {
        let big = dec!(50000000000000000000000000000);
        let err = EntityStore::load(
            vec![company("A", 1, dec!(1)), company("B", 1, dec!(1))],
            vec![tx("A", "B", big), tx("A", "B", big)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataIntegrityError::AmountOverflow {
                dataset: "transaction",
                row: 2,
                column: "VL",
            }
        ));

        let err = EntityStore::load(
            vec![company("A", 1, big), company("A", 2, -big)],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataIntegrityError::AmountOverflow { column: "VL_SLDO", .. }
        ));
    }

    #[test]
    fn test_conflicting_sector_rejected() {
        let err = EntityStore::load(
            vec![
                company("A", 1, dec!(1)),
                CompanyRecord::new("A", month(2), dec!(1), dec!(1), "Industria"),
            ],
            vec![],
        )
        .unwrap_err();
        match err {
            DataIntegrityError::SectorMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected.as_str(), "Varejo");
                assert_eq!(found.as_str(), "Industria");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reload_keeps_declared_window() {
        let window = ReportingWindow::new(month(1), month(2));
        let mut store =
            EntityStore::load_with_window(vec![company("A", 1, dec!(1))], vec![], window)
                .unwrap();

        let err = store
            .reload(vec![company("A", 2, dec!(1)), company("A", 3, dec!(1))], vec![])
            .unwrap_err();
        assert!(matches!(err, DataIntegrityError::OutsideWindow { .. }));
        assert_eq!(store.window(), Some(window));

        store.reload(vec![company("A", 2, dec!(5))], vec![]).unwrap();
        assert_eq!(store.window(), Some(window));
        assert_eq!(store.get(&"A".into()).unwrap().age_months(), 1);
    }
}
