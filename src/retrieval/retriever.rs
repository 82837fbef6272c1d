use crate::core::entity::EntityId;
use crate::core::money;
use crate::core::store::EntityStore;
use crate::graph::relationship_graph::RelationshipGraph;
use crate::retrieval::bundle::{ContextBundle, Fragment, FragmentKind, NO_DATA};
use crate::retrieval::format::{brl, entity_summary, kind_breakdown, unknown_entity, NOT_AVAILABLE};
use crate::retrieval::rules::{
    health_ranking, neighborhood_fragment, revenue_ranking, sector_distribution, KeywordClass,
    RuleContext, RULES,
};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tuning of the fragment selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Rows per ranking fragment.
    pub top_n: usize,
    /// Health score under which an entity is listed as at risk.
    pub risk_threshold: f64,
    /// Counterparties shown in a neighborhood fragment.
    pub neighbor_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            risk_threshold: 50.0,
            neighbor_limit: 10,
        }
    }
}

/// Size bounds of a [`ContextBundle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalLimits {
    pub max_fragments: usize,
    pub max_chars: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            max_fragments: 12,
            max_chars: 8000,
        }
    }
}

/// Assembles the context for a question from store, metric and graph
/// values. Stateless apart from its configuration.
///
/// # Examples
///
/// ```
/// use cnpj_insight::core::store::EntityStore;
/// use cnpj_insight::graph::relationship_graph::RelationshipGraph;
/// use cnpj_insight::retrieval::bundle::FragmentKind;
/// use cnpj_insight::retrieval::retriever::{ContextRetriever, RetrievalLimits};
///
/// let store = EntityStore::new();
/// let graph = RelationshipGraph::default();
/// let bundle = ContextRetriever::default().retrieve(
///     "qual empresa tem maior risco?",
///     None,
///     &store,
///     &graph,
///     RetrievalLimits::default(),
/// );
/// assert_eq!(bundle.len(), 1);
/// assert_eq!(bundle.fragments()[0].kind, FragmentKind::NoData);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContextRetriever {
    config: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Keyword classes the query triggers with their hit counts, most
    /// hits first, ties in rule order.
    pub fn matched_classes(
        &self,
        query: &str,
        focus: Option<&EntityId>,
        store: &EntityStore,
        graph: &RelationshipGraph,
    ) -> Vec<(KeywordClass, usize)> {
        let query = query.to_lowercase();
        let ctx = RuleContext {
            query: &query,
            focus: focus.filter(|id| store.contains(id)),
            store,
            graph,
            config: &self.config,
        };
        ranked_rules(&ctx)
            .into_iter()
            .map(|(i, hits)| (RULES[i].class, hits))
            .collect()
    }

    /// Build the context bundle for `query`.
    ///
    /// Fragments come in three groups: primary (the focus entity, or the
    /// portfolio overview), fragments of the matched keyword classes, then
    /// background statistics. Repeated fragments are skipped and the
    /// result respects `limits`.
    pub fn retrieve(
        &self,
        query: &str,
        focus: Option<&EntityId>,
        store: &EntityStore,
        graph: &RelationshipGraph,
        limits: RetrievalLimits,
    ) -> ContextBundle {
        if store.is_empty() {
            return ContextBundle::assemble(
                [Fragment::new(FragmentKind::NoData, NO_DATA)],
                limits.max_fragments,
                limits.max_chars,
            );
        }

        let query = query.to_lowercase();
        let mut primary = Vec::new();
        let mut background = Vec::new();

        let known_focus = match focus {
            Some(id) => match (store.get(id), store.metrics(id)) {
                (Ok(entity), Ok(metrics)) => {
                    primary.push(Fragment::new(
                        FragmentKind::EntitySummary,
                        entity_summary(entity, metrics),
                    ));
                    primary.push(neighborhood_fragment(
                        id,
                        store,
                        graph,
                        self.config.neighbor_limit,
                    ));
                    background.push(portfolio_overview(store));
                    Some(id)
                }
                _ => {
                    warn!("focus entity {} is not in the dataset", id);
                    primary.push(Fragment::new(
                        FragmentKind::NotAvailable,
                        unknown_entity(id.as_str()),
                    ));
                    primary.push(portfolio_overview(store));
                    None
                }
            },
            None => {
                primary.push(portfolio_overview(store));
                None
            }
        };
        if known_focus.is_none() {
            background.push(sector_distribution(store, self.config.top_n));
            background.push(health_ranking(store, self.config.top_n));
            background.push(revenue_ranking(store, self.config.top_n));
        }

        let ctx = RuleContext {
            query: &query,
            focus: known_focus,
            store,
            graph,
            config: &self.config,
        };
        let mut matched = Vec::new();
        for (i, hits) in ranked_rules(&ctx) {
            let rule = &RULES[i];
            debug!("query matched {} ({} hits)", rule.class, hits);
            matched.extend((rule.selector)(&ctx));
        }

        let mut seen = HashSet::new();
        let candidates: Vec<Fragment> = primary
            .into_iter()
            .chain(matched)
            .chain(background)
            .filter(|f| seen.insert(f.text.clone()))
            .collect();
        ContextBundle::assemble(candidates, limits.max_fragments, limits.max_chars)
    }
}

/// Indices into [`RULES`] of the rules with at least one hit, ordered by
/// hit count descending and rule position ascending.
fn ranked_rules(ctx: &RuleContext<'_>) -> Vec<(usize, usize)> {
    let mut hits: Vec<(usize, usize)> = RULES
        .iter()
        .enumerate()
        .map(|(i, rule)| (i, (rule.matcher)(ctx)))
        .filter(|(_, hits)| *hits > 0)
        .collect();
    hits.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    hits
}

/// Portfolio-level counts and totals.
fn portfolio_overview(store: &EntityStore) -> Fragment {
    let transactions = store.transactions();
    let volume = money::total(transactions.iter().map(|t| t.amount()));
    let revenues: Vec<Decimal> = store
        .all()
        .iter()
        .filter_map(|e| e.current_revenue())
        .collect();
    let mean_revenue = if revenues.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        brl(money::mean(&revenues))
    };
    let window = store
        .window()
        .map(|w| w.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let dates = transactions.iter().map(|t| t.date());
    let span = dates
        .clone()
        .min()
        .zip(dates.max())
        .map(|(first, last)| format!("{} to {}", first, last))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    Fragment::new(
        FragmentKind::PortfolioOverview,
        format!(
            "Portfolio overview:\n- entities: {}\n- transactions: {}\n- total volume: {}\n- volume by transaction kind: {}\n- transaction dates: {}\n- mean current revenue per entity: {}\n- reporting window: {}",
            store.len(),
            transactions.len(),
            brl(volume),
            kind_breakdown(transactions),
            span,
            mean_revenue,
            window
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Month;
    use crate::core::records::{CompanyRecord, TransactionRecord};
    use crate::core::transaction::TransactionKind;
    use crate::retrieval::bundle::TRUNCATION_MARKER;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn store() -> EntityStore {
        let mut companies = Vec::new();
        for (id, sector, balances) in [
            ("A", "Varejo", [dec!(100), dec!(80), dec!(60)]),
            ("B", "Varejo", [dec!(50), dec!(60), dec!(70)]),
            ("C", "Industria", [dec!(10), dec!(10), dec!(10)]),
        ] {
            for (m, balance) in balances.into_iter().enumerate() {
                companies.push(CompanyRecord::new(
                    id,
                    Month::new(2025, m as u32 + 1).unwrap(),
                    dec!(1000),
                    balance,
                    sector,
                ));
            }
        }
        let day = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
        let transactions = vec![
            TransactionRecord::new("A", "B", dec!(50), day, TransactionKind::Pix),
            TransactionRecord::new("A", "C", dec!(50), day, TransactionKind::Ted),
            TransactionRecord::new("B", "C", dec!(10), day, TransactionKind::Boleto),
        ];
        EntityStore::load(companies, transactions).unwrap()
    }

    fn retrieve(query: &str, focus: Option<&EntityId>) -> ContextBundle {
        let store = store();
        let graph = RelationshipGraph::build(store.transactions());
        ContextRetriever::default().retrieve(query, focus, &store, &graph, RetrievalLimits::default())
    }

    #[test]
    fn test_focus_comes_first() {
        let focus = EntityId::new("A");
        let bundle = retrieve("como está esta empresa?", Some(&focus));
        let kinds: Vec<FragmentKind> = bundle.fragments().iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FragmentKind::EntitySummary,
                FragmentKind::Neighborhood,
                FragmentKind::PortfolioOverview
            ]
        );
        assert!(bundle.fragments()[0].text.starts_with("Entity A "));
    }

    #[test]
    fn test_unknown_focus_is_reported() {
        let focus = EntityId::new("ZZZ");
        let bundle = retrieve("resumo", Some(&focus));
        assert_eq!(bundle.fragments()[0].kind, FragmentKind::NotAvailable);
        assert!(bundle.fragments()[0].text.contains("not available"));
        assert_eq!(bundle.fragments()[1].kind, FragmentKind::PortfolioOverview);
    }

    #[test]
    fn test_overview_without_focus() {
        let bundle = retrieve("bom dia", None);
        let kinds: Vec<FragmentKind> = bundle.fragments().iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FragmentKind::PortfolioOverview,
                FragmentKind::SectorDistribution,
                FragmentKind::HealthRanking,
                FragmentKind::RevenueRanking
            ]
        );
        let overview = &bundle.fragments()[0].text;
        assert!(overview.contains("- entities: 3"));
        assert!(overview.contains("- transactions: 3"));
        assert!(overview.contains("R$ 110,00"));
        assert!(overview.contains("2025-01 to 2025-03"));
        assert!(overview.contains(
            "- volume by transaction kind: PIX R$ 50,00 in 1 transactions, TED R$ 50,00 in 1 transactions, BOLETO R$ 10,00 in 1 transactions"
        ));
        assert!(overview.contains("- transaction dates: 2025-02-10 to 2025-02-10"));
    }

    #[test]
    fn test_revenue_ranking_orders_by_current_revenue() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let month = Month::new(2025, 1).unwrap();
        let store = EntityStore::load(
            vec![
                CompanyRecord::new("LOW", month, dec!(100), dec!(1), "Varejo"),
                CompanyRecord::new("HIGH", month, dec!(9000), dec!(1), "Varejo"),
                CompanyRecord::new("MID", month, dec!(500), dec!(1), "Industria"),
            ],
            vec![TransactionRecord::new("LOW", "HIGH", dec!(1), day, TransactionKind::Pix)],
        )
        .unwrap();
        let text = revenue_ranking(&store, 2).text;
        assert_eq!(
            text,
            "Top entities by current revenue:\n- HIGH: R$ 9.000,00, sector Varejo\n- MID: R$ 500,00, sector Industria"
        );
    }

    #[test]
    fn test_neighborhood_splits_payments_and_receipts() {
        let focus = EntityId::new("B");
        let bundle = retrieve("como está esta empresa?", Some(&focus));
        let neighborhood = &bundle.fragments()[1];
        assert_eq!(neighborhood.kind, FragmentKind::Neighborhood);
        assert!(neighborhood
            .text
            .contains("Top payments (paid to):\n- C: R$ 10,00 in 1 transactions"));
        assert!(neighborhood
            .text
            .contains("Top receipts (received from):\n- A: R$ 50,00 in 1 transactions"));
        assert!(neighborhood.text.ends_with(
            "Transactions by kind: PIX R$ 50,00 in 1 transactions, BOLETO R$ 10,00 in 1 transactions"
        ));
    }

    #[test]
    fn test_unloaded_entity_id_is_reported() {
        let month = Month::new(2025, 1).unwrap();
        let store = EntityStore::load(
            vec![CompanyRecord::new("CNPJ_00001", month, dec!(10), dec!(5), "Varejo")],
            Vec::new(),
        )
        .unwrap();
        let graph = RelationshipGraph::build(store.transactions());
        let retriever = ContextRetriever::default();
        let query = "qual o saldo do CNPJ_00042?";

        assert_eq!(
            retriever.matched_classes(query, None, &store, &graph),
            vec![(KeywordClass::EntityId, 1)]
        );
        let bundle = retriever.retrieve(query, None, &store, &graph, RetrievalLimits::default());
        let missing = bundle
            .fragments()
            .iter()
            .find(|f| f.kind == FragmentKind::NotAvailable)
            .unwrap();
        assert_eq!(
            missing.text,
            "Entity CNPJ_00042: not available (not in the loaded dataset)"
        );
        assert!(bundle
            .fragments()
            .iter()
            .all(|f| f.kind != FragmentKind::EntitySummary));

        let both = retriever.retrieve(
            "compare cnpj_00001 e cnpj_00042",
            None,
            &store,
            &graph,
            RetrievalLimits::default(),
        );
        let kinds: Vec<FragmentKind> = both.fragments().iter().map(|f| f.kind).collect();
        assert_eq!(
            &kinds[..3],
            &[
                FragmentKind::PortfolioOverview,
                FragmentKind::EntitySummary,
                FragmentKind::NotAvailable
            ]
        );
    }

    #[test]
    fn test_risk_ranking_ascending() {
        let bundle = retrieve("qual o risco?", None);
        let risk = bundle
            .fragments()
            .iter()
            .find(|f| f.kind == FragmentKind::RiskRanking)
            .unwrap();
        assert!(risk.text.starts_with("Entities with health score below 50"));
        assert_eq!(bundle.fragments()[1].kind, FragmentKind::RiskRanking);
    }

    #[test]
    fn test_matched_order_by_hits() {
        let store = store();
        let graph = RelationshipGraph::build(store.transactions());
        let retriever = ContextRetriever::default();
        let classes = retriever.matched_classes(
            "concentração e dependência, e o risco?",
            None,
            &store,
            &graph,
        );
        assert_eq!(
            classes,
            vec![(KeywordClass::Concentration, 2), (KeywordClass::Risk, 1)]
        );
    }

    #[test]
    fn test_entity_mentions_and_sectors() {
        let store = store();
        let graph = RelationshipGraph::build(store.transactions());
        let classes = ContextRetriever::default().matched_classes(
            "compare b com o setor varejo",
            None,
            &store,
            &graph,
        );
        assert!(classes.contains(&(KeywordClass::EntityId, 1)));
        assert!(classes.contains(&(KeywordClass::Sector, 1)));
    }

    #[test]
    fn test_no_duplicate_fragments() {
        let focus = EntityId::new("A");
        let bundle = retrieve("rede de relacionamentos", Some(&focus));
        let neighborhoods = bundle
            .fragments()
            .iter()
            .filter(|f| f.kind == FragmentKind::Neighborhood)
            .count();
        assert_eq!(neighborhoods, 1);
    }

    #[test]
    fn test_limits_respected() {
        let store = store();
        let graph = RelationshipGraph::build(store.transactions());
        let limits = RetrievalLimits {
            max_fragments: 10,
            max_chars: 120,
        };
        let bundle = ContextRetriever::default().retrieve("risco", None, &store, &graph, limits);
        let text = bundle.render();
        assert!(text.chars().count() <= 120);
        assert!(text.ends_with(TRUNCATION_MARKER));
    }
}
