use crate::core::entity::{Entity, EntityId};
use crate::core::error::InsufficientDataError;
use crate::core::transaction::Transaction;
use crate::metrics::concentration::{concentration, Concentration};
use crate::metrics::liquidity::{
    balance_cv, balance_variation, burn_rate, mean_abs_balance, mean_outflow, risk_alerts, runway,
    RiskAlert, Runway,
};
use crate::metrics::scoring::{
    credit_score, dependency_risk, health_score, CreditInputs, CreditScore, DependencyRisk,
    HealthBand, HealthInputs,
};
use crate::metrics::trend::{lifecycle_stage, revenue_trend, LifecycleStage};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Derived metrics of one entity.
///
/// A metric that cannot be computed from the available series is `None`
/// and must be shown as "not available", never as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub entity: EntityId,
    pub concentration: Concentration,
    /// Average monthly balance change; negative when burning cash.
    pub burn_rate: Option<Decimal>,
    pub runway: Option<Runway>,
    /// Relative monthly revenue slope.
    pub revenue_trend: Option<f64>,
    pub health_score: Option<f64>,
    pub lifecycle: Option<LifecycleStage>,
    /// Balance coefficient of variation.
    pub balance_cv: Option<f64>,
    pub dependency_risk: Option<DependencyRisk>,
    pub credit_score: Option<CreditScore>,
    pub current_balance: Option<Decimal>,
    pub balance_variation: Option<Decimal>,
    pub alerts: Vec<RiskAlert>,
}

impl MetricSet {
    pub fn hhi(&self) -> f64 {
        self.concentration.hhi
    }

    pub fn health_band(&self) -> Option<HealthBand> {
        self.health_score.map(HealthBand::from_score)
    }

    /// Names of the metrics that could not be computed.
    pub fn unavailable(&self) -> Vec<&'static str> {
        let checks = [
            ("burn rate", self.burn_rate.is_none()),
            ("runway", self.runway.is_none()),
            ("revenue trend", self.revenue_trend.is_none()),
            ("health score", self.health_score.is_none()),
            ("lifecycle stage", self.lifecycle.is_none()),
            ("balance stability", self.balance_cv.is_none()),
            ("dependency risk", self.dependency_risk.is_none()),
            ("credit score", self.credit_score.is_none()),
        ];
        checks
            .into_iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Computes [`MetricSet`]s. Stateless: the same inputs always give the
/// same output.
pub struct MetricsEngine;

impl MetricsEngine {
    /// Compute every metric of `entity` from its own series and the
    /// transactions it takes part in.
    ///
    /// Transactions not involving the entity are ignored. A metric lacking
    /// data is left as `None` without affecting the others.
    pub fn compute<'a, I>(entity: &Entity, transactions: I) -> MetricSet
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let id = entity.id();
        let txs: Vec<&Transaction> = transactions.into_iter().collect();
        let balances = entity.balance_series();
        let revenues = entity.revenue_series();

        let concentration = concentration(id, &txs);
        let current_balance = entity.current_balance();
        let burn = available(id, burn_rate(&balances));
        let runway = burn.zip(current_balance).map(|(b, c)| runway(c, b));
        let trend = available(id, revenue_trend(&revenues));
        let cv = available(id, balance_cv(&balances));
        let variation = available(id, balance_variation(&balances));
        let lifecycle = available(id, lifecycle_stage(entity.age_months(), trend));

        let health_score = match (burn, runway, trend) {
            (Some(burn_rate), Some(runway), Some(revenue_trend)) => {
                Some(health_score(&HealthInputs {
                    burn_rate,
                    mean_abs_balance: mean_abs_balance(&balances),
                    runway,
                    hhi: concentration.hhi,
                    revenue_trend,
                }))
            }
            _ => None,
        };

        let outflow = available(id, mean_outflow(&balances));
        let credit_score = match (current_balance, outflow, variation, cv) {
            (Some(current_balance), Some(outflow), Some(balance_variation), Some(balance_cv)) => {
                Some(credit_score(&CreditInputs {
                    current_balance,
                    outflow,
                    balance_variation,
                    balance_cv,
                    counterparties: concentration.counterparties,
                    directional_hhi: concentration.directional_mean(),
                    volume: concentration.volume,
                    age_months: entity.age_months(),
                }))
            }
            _ => None,
        };

        let alerts = risk_alerts(current_balance, runway, variation, entity.current_revenue());

        MetricSet {
            entity: id.clone(),
            dependency_risk: dependency_risk(&concentration),
            concentration,
            burn_rate: burn,
            runway,
            revenue_trend: trend,
            health_score,
            lifecycle,
            balance_cv: cv,
            credit_score,
            current_balance,
            balance_variation: variation,
            alerts,
        }
    }
}

fn available<T>(entity: &EntityId, result: Result<T, InsufficientDataError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("{}: {}", entity, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Month, SectorCode, Snapshot};
    use crate::core::transaction::TransactionKind;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn entity(id: &str, balances: &[Decimal]) -> Entity {
        let mut month = Month::new(2025, 1).unwrap();
        let snapshots = balances
            .iter()
            .map(|&balance| {
                let s = Snapshot {
                    month,
                    revenue: dec!(1000),
                    balance,
                };
                month = month.succ();
                s
            })
            .collect();
        Entity::new(EntityId::new(id), SectorCode::new("Varejo"), snapshots)
    }

    #[test]
    fn test_linear_burn_scenario() {
        let e = entity(
            "E007",
            &[dec!(100), dec!(80), dec!(60), dec!(40), dec!(20)],
        );
        let m = MetricsEngine::compute(&e, []);
        assert_eq!(m.burn_rate, Some(dec!(-20)));
        assert_eq!(m.runway, Some(Runway::Months(1)));
        assert_eq!(m.hhi(), 0.0);
        assert_eq!(m.lifecycle, Some(LifecycleStage::Mature));
        assert!(m.alerts.contains(&RiskAlert::ShortRunway));
        let score = m.health_score.unwrap();
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_single_month_reports_gaps() {
        let e = entity("A", &[dec!(10)]);
        let m = MetricsEngine::compute(&e, []);
        assert_eq!(m.burn_rate, None);
        assert_eq!(m.runway, None);
        assert_eq!(m.health_score, None);
        assert_eq!(m.lifecycle, Some(LifecycleStage::Starting));
        assert_eq!(m.dependency_risk, None);
        assert!(m.unavailable().contains(&"health score"));
        assert!(!m.unavailable().contains(&"lifecycle stage"));
    }

    #[test]
    fn test_deterministic() {
        let e = entity("A", &[dec!(10), dec!(30), dec!(20)]);
        let txs = [Transaction::new(
            EntityId::new("A"),
            EntityId::new("B"),
            dec!(5),
            NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            TransactionKind::Pix,
        )];
        assert_eq!(
            MetricsEngine::compute(&e, &txs),
            MetricsEngine::compute(&e, &txs)
        );
    }
}
