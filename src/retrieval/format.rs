use crate::core::entity::Entity;
use crate::core::transaction::{Transaction, TransactionKind};
use crate::graph::relationship_graph::Neighbor;
use crate::metrics::engine::MetricSet;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Placeholder for a metric that could not be computed.
pub const NOT_AVAILABLE: &str = "not available";

/// Format a money amount in Brazilian notation: `R$ 1.234.567,89`.
///
/// ```
/// use cnpj_insight::retrieval::format::brl;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(brl(dec!(1234567.891)), "R$ 1.234.567,89");
/// assert_eq!(brl(dec!(-20)), "-R$ 20,00");
/// ```
pub fn brl(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}R$ {},{}", sign, grouped, frac_part)
}

/// `value` formatted, or [`NOT_AVAILABLE`].
pub fn or_not_available<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Multi-line summary of every metric of one entity. Missing metrics
/// read "not available".
pub fn entity_summary(entity: &Entity, metrics: &MetricSet) -> String {
    let period = match (entity.first_month(), entity.last_month()) {
        (Some(first), Some(last)) => format!("{} to {}", first, last),
        _ => NOT_AVAILABLE.to_string(),
    };
    let c = &metrics.concentration;

    let lines = [
        format!(
            "Entity {} (sector {}, {} months reported, {})",
            entity.id(),
            entity.sector(),
            entity.age_months(),
            period
        ),
        format!(
            "- current revenue: {}",
            or_not_available(entity.current_revenue().map(brl))
        ),
        format!(
            "- current balance: {}",
            or_not_available(metrics.current_balance.map(brl))
        ),
        format!(
            "- balance variation: {}",
            or_not_available(metrics.balance_variation.map(brl))
        ),
        format!("- monthly balance: {}", monthly_balances(entity)),
        format!(
            "- burn rate: {}",
            or_not_available(metrics.burn_rate.map(|b| format!("{}/month", brl(b))))
        ),
        format!("- runway: {}", or_not_available(metrics.runway)),
        format!(
            "- revenue trend: {}",
            or_not_available(
                metrics
                    .revenue_trend
                    .map(|t| format!("{:+.1}% of mean revenue per month", t * 100.0))
            )
        ),
        format!(
            "- health score: {}",
            or_not_available(
                metrics
                    .health_score
                    .zip(metrics.health_band())
                    .map(|(s, band)| format!("{:.1} ({})", s, band))
            )
        ),
        format!("- lifecycle stage: {}", or_not_available(metrics.lifecycle)),
        format!(
            "- balance stability (CV): {}",
            or_not_available(metrics.balance_cv.map(|cv| format!("{:.3}", cv)))
        ),
        format!(
            "- concentration (HHI): {:.3} (payments {:.3}, receipts {:.3}), {} counterparties, {} transactions, volume {}",
            c.hhi,
            c.payment_hhi,
            c.receipt_hhi,
            c.counterparties,
            c.transactions,
            brl(c.volume)
        ),
        format!(
            "- dependency risk: {}",
            or_not_available(
                metrics
                    .dependency_risk
                    .map(|d| format!("{:.1} ({})", d.score, d.level))
            )
        ),
        format!("- credit score: {}", or_not_available(metrics.credit_score)),
        format!("- alerts: {}", alert_list(metrics)),
    ];
    lines.join("\n")
}

/// Counterparty list of an entity, one line per neighbor.
pub fn neighborhood(entity: &str, neighbors: &[Neighbor], total: usize) -> String {
    let mut out = format!(
        "Relationships of {} ({} counterparties, top {} by volume):",
        entity,
        total,
        neighbors.len()
    );
    for n in neighbors {
        out.push_str(&format!(
            "\n- {}: {} in {} transactions",
            n.counterparty,
            brl(n.amount),
            n.count
        ));
    }
    out
}

/// Titled list of counterparties, or "none".
pub fn flow_section(title: &str, neighbors: &[Neighbor]) -> String {
    let mut out = format!("{}:", title);
    if neighbors.is_empty() {
        out.push_str("\n- none");
    }
    for n in neighbors {
        out.push_str(&format!(
            "\n- {}: {} in {} transactions",
            n.counterparty,
            brl(n.amount),
            n.count
        ));
    }
    out
}

/// Volume and count per settlement rail, in rail order. Rails without
/// transactions are omitted.
///
/// ```
/// use cnpj_insight::core::transaction::{Transaction, TransactionKind};
/// use cnpj_insight::retrieval::format::kind_breakdown;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
/// let txs = vec![
///     Transaction::new("A".into(), "B".into(), dec!(10), day, TransactionKind::Ted),
///     Transaction::new("A".into(), "B".into(), dec!(5), day, TransactionKind::Pix),
///     Transaction::new("B".into(), "A".into(), dec!(5), day, TransactionKind::Pix),
/// ];
/// assert_eq!(
///     kind_breakdown(&txs),
///     "PIX R$ 10,00 in 2 transactions, TED R$ 10,00 in 1 transactions"
/// );
/// ```
pub fn kind_breakdown<'a, I>(transactions: I) -> String
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut by_kind: BTreeMap<TransactionKind, (Decimal, usize)> = BTreeMap::new();
    for tx in transactions {
        let slot = by_kind.entry(tx.kind()).or_insert((Decimal::ZERO, 0));
        slot.0 = slot.0.saturating_add(tx.amount());
        slot.1 += 1;
    }
    if by_kind.is_empty() {
        return "none".to_string();
    }
    by_kind
        .into_iter()
        .map(|(kind, (amount, count))| format!("{} {} in {} transactions", kind, brl(amount), count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Note for an entity id absent from the loaded dataset.
pub fn unknown_entity(id: &str) -> String {
    format!("Entity {}: {} (not in the loaded dataset)", id, NOT_AVAILABLE)
}

fn monthly_balances(entity: &Entity) -> String {
    if entity.snapshots().is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    entity
        .snapshots()
        .iter()
        .map(|s| format!("{} {}", s.month, brl(s.balance)))
        .collect::<Vec<_>>()
        .join("; ")
}

fn alert_list(metrics: &MetricSet) -> String {
    if metrics.alerts.is_empty() {
        return "none".to_string();
    }
    metrics
        .alerts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{EntityId, Month, SectorCode, Snapshot};
    use crate::metrics::engine::MetricsEngine;
    use rust_decimal_macros::dec;

    #[test]
    fn test_brl() {
        assert_eq!(brl(Decimal::ZERO), "R$ 0,00");
        assert_eq!(brl(dec!(999)), "R$ 999,00");
        assert_eq!(brl(dec!(1000)), "R$ 1.000,00");
        assert_eq!(brl(dec!(199929313)), "R$ 199.929.313,00");
        assert_eq!(brl(dec!(-0.001)), "R$ 0,00");
        assert_eq!(brl(dec!(0.5)), "R$ 0,50");
    }

    #[test]
    fn test_summary_marks_missing_metrics() {
        let entity = Entity::new(
            EntityId::new("A"),
            SectorCode::new("Varejo"),
            vec![Snapshot {
                month: Month::new(2025, 1).unwrap(),
                revenue: dec!(1000),
                balance: dec!(50),
            }],
        );
        let metrics = MetricsEngine::compute(&entity, []);
        let text = entity_summary(&entity, &metrics);
        assert!(text.starts_with("Entity A (sector Varejo, 1 months reported, 2025-01 to 2025-01)"));
        assert!(text.contains("- burn rate: not available"));
        assert!(text.contains("- runway: not available"));
        assert!(text.contains("- current balance: R$ 50,00"));
        assert!(text.contains("- lifecycle stage: Starting"));
        assert!(text.contains("- monthly balance: 2025-01 R$ 50,00"));
    }

    #[test]
    fn test_summary_lists_monthly_balances() {
        let snapshot = |month: u32, balance: Decimal| Snapshot {
            month: Month::new(2025, month).unwrap(),
            revenue: dec!(10),
            balance,
        };
        let entity = Entity::new(
            EntityId::new("B"),
            SectorCode::new("Servicos"),
            vec![snapshot(2, dec!(-5)), snapshot(1, dec!(1500))],
        );
        let metrics = MetricsEngine::compute(&entity, []);
        let text = entity_summary(&entity, &metrics);
        assert!(text.contains("- monthly balance: 2025-01 R$ 1.500,00; 2025-02 -R$ 5,00\n"));
    }

    #[test]
    fn test_flow_section() {
        assert_eq!(flow_section("Top payments (paid to)", &[]), "Top payments (paid to):\n- none");
        let neighbors = [Neighbor {
            counterparty: EntityId::new("C"),
            amount: dec!(30),
            count: 2,
        }];
        assert_eq!(
            flow_section("Top receipts (received from)", &neighbors),
            "Top receipts (received from):\n- C: R$ 30,00 in 2 transactions"
        );
    }
}
