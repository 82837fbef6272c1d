use crate::core::entity::{Entity, EntityId};
use crate::core::money;
use crate::core::store::EntityStore;
use crate::graph::relationship_graph::{FlowDirection, RelationshipGraph};
use crate::metrics::engine::MetricSet;
use crate::metrics::trend::LifecycleStage;
use crate::retrieval::bundle::{Fragment, FragmentKind};
use crate::retrieval::format::{
    brl, entity_summary, flow_section, kind_breakdown, neighborhood, or_not_available,
    unknown_entity,
};
use crate::retrieval::retriever::RetrievalConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Families of query terms, each mapped to a fragment selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordClass {
    Risk,
    Concentration,
    Growth,
    Relationships,
    Lifecycle,
    Sector,
    EntityId,
}

impl fmt::Display for KeywordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KeywordClass::Risk => "risk",
            KeywordClass::Concentration => "concentration",
            KeywordClass::Growth => "growth",
            KeywordClass::Relationships => "relationships",
            KeywordClass::Lifecycle => "lifecycle",
            KeywordClass::Sector => "sector",
            KeywordClass::EntityId => "entity id",
        };
        f.write_str(label)
    }
}

pub const RISK_TERMS: &[&str] = &[
    "risco", "risk", "liquidez", "liquidity", "runway", "burn", "saúde", "saude", "health",
    "alerta", "alert", "perigo", "inadimpl", "crise",
];
pub const CONCENTRATION_TERMS: &[&str] = &[
    "concentra", "hhi", "dependên", "dependen", "dependency", "diversifica",
];
pub const GROWTH_TERMS: &[&str] = &[
    "cresc", "growth", "growing", "crédito", "credito", "credit", "melhor", "best", "investi",
];
pub const RELATIONSHIP_TERMS: &[&str] = &[
    "relacion", "relationship", "rede", "network", "parceir", "partner", "fluxo", "flow",
    "transaç", "transac", "contraparte", "counterpart",
];
pub const LIFECYCLE_TERMS: &[&str] = &[
    "ciclo", "lifecycle", "estágio", "estagio", "stage", "maturidade", "madura", "mature",
    "declín", "declin", "inici",
];

/// Everything a rule may read. `query` is already lowercased and `focus`
/// is only set for an entity present in the store.
pub struct RuleContext<'a> {
    pub query: &'a str,
    pub focus: Option<&'a EntityId>,
    pub store: &'a EntityStore,
    pub graph: &'a RelationshipGraph,
    pub config: &'a RetrievalConfig,
}

/// One row of the rule table: a matcher returning its hit count for the
/// query and the selector producing the fragments when it hits.
pub struct RetrievalRule {
    pub class: KeywordClass,
    pub matcher: fn(&RuleContext<'_>) -> usize,
    pub selector: fn(&RuleContext<'_>) -> Vec<Fragment>,
}

/// Rule table in priority order; ties on hit count keep this order.
pub const RULES: &[RetrievalRule] = &[
    RetrievalRule {
        class: KeywordClass::EntityId,
        matcher: match_entity_ids,
        selector: select_mentioned_entities,
    },
    RetrievalRule {
        class: KeywordClass::Risk,
        matcher: match_risk,
        selector: select_risk,
    },
    RetrievalRule {
        class: KeywordClass::Concentration,
        matcher: match_concentration,
        selector: select_concentration,
    },
    RetrievalRule {
        class: KeywordClass::Growth,
        matcher: match_growth,
        selector: select_growth,
    },
    RetrievalRule {
        class: KeywordClass::Relationships,
        matcher: match_relationships,
        selector: select_relationships,
    },
    RetrievalRule {
        class: KeywordClass::Lifecycle,
        matcher: match_lifecycle,
        selector: select_lifecycle,
    },
    RetrievalRule {
        class: KeywordClass::Sector,
        matcher: match_sectors,
        selector: select_sectors,
    },
];

/// Prefix of a CNPJ-style entity id as it appears in a lowercased query.
pub const ENTITY_ID_PREFIX: &str = "cnpj_";

/// Digits of a bare CNPJ number.
const CNPJ_DIGITS: usize = 14;

/// Number of `terms` that start a word of `query`.
///
/// Terms are stems, so the word may continue ("risco" matches "riscos"),
/// but a term inside a longer word does not count.
pub fn keyword_hits(query: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|t| starts_word(query, t)).count()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// The characters just before and just after each occurrence of `needle`.
fn occurrences<'a>(
    haystack: &'a str,
    needle: &'a str,
) -> impl Iterator<Item = (Option<char>, Option<char>)> + 'a {
    haystack
        .match_indices(needle)
        .filter(move |_| !needle.is_empty())
        .map(move |(start, _)| {
            (
                haystack[..start].chars().next_back(),
                haystack[start + needle.len()..].chars().next(),
            )
        })
}

/// True when `needle` occurs in `haystack` at the start of a word.
fn starts_word(haystack: &str, needle: &str) -> bool {
    occurrences(haystack, needle).any(|(before, _)| !before.is_some_and(is_word_char))
}

/// True when `needle` occurs in `haystack` not glued to other word
/// characters.
fn contains_token(haystack: &str, needle: &str) -> bool {
    occurrences(haystack, needle)
        .any(|(before, after)| !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char))
}

/// True for words shaped like an entity id: `cnpj_` followed by more word
/// characters, or a bare 14-digit CNPJ.
fn looks_like_entity_id(word: &str) -> bool {
    match word.strip_prefix(ENTITY_ID_PREFIX) {
        Some(rest) => !rest.is_empty(),
        None => word.len() == CNPJ_DIGITS && word.chars().all(|c| c.is_ascii_digit()),
    }
}

fn match_risk(ctx: &RuleContext<'_>) -> usize {
    keyword_hits(ctx.query, RISK_TERMS)
}

fn match_concentration(ctx: &RuleContext<'_>) -> usize {
    keyword_hits(ctx.query, CONCENTRATION_TERMS)
}

fn match_growth(ctx: &RuleContext<'_>) -> usize {
    keyword_hits(ctx.query, GROWTH_TERMS)
}

fn match_relationships(ctx: &RuleContext<'_>) -> usize {
    keyword_hits(ctx.query, RELATIONSHIP_TERMS)
}

fn match_lifecycle(ctx: &RuleContext<'_>) -> usize {
    keyword_hits(ctx.query, LIFECYCLE_TERMS)
}

fn match_sectors(ctx: &RuleContext<'_>) -> usize {
    mentioned_sectors(ctx).len()
}

fn match_entity_ids(ctx: &RuleContext<'_>) -> usize {
    mentioned_entities(ctx).len() + unknown_entity_ids(ctx).len()
}

fn mentioned_entities<'a>(ctx: &RuleContext<'a>) -> Vec<&'a Entity> {
    ctx.store
        .all()
        .iter()
        .filter(|e| contains_token(ctx.query, &e.id().as_str().to_lowercase()))
        .collect()
}

/// Id-shaped words of the query that name no loaded entity, deduplicated
/// in order of appearance.
fn unknown_entity_ids(ctx: &RuleContext<'_>) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    for word in ctx.query.split(|c: char| !is_word_char(c)) {
        if !looks_like_entity_id(word) || unknown.iter().any(|u| u == word) {
            continue;
        }
        let loaded = ctx
            .store
            .all()
            .iter()
            .any(|e| e.id().as_str().to_lowercase() == word);
        if !loaded {
            unknown.push(word.to_string());
        }
    }
    unknown
}

/// Distinct sector names found in the query, in order of first appearance
/// in the store.
fn mentioned_sectors<'a>(ctx: &RuleContext<'a>) -> Vec<&'a str> {
    let mut sectors: Vec<&str> = Vec::new();
    for entity in ctx.store.all() {
        let name = entity.sector().as_str();
        if !sectors.contains(&name) && contains_token(ctx.query, &name.to_lowercase()) {
            sectors.push(name);
        }
    }
    sectors
}

/// Summaries of the loaded entities the query names, then a not-available
/// note for each id-shaped word naming no loaded entity.
fn select_mentioned_entities(ctx: &RuleContext<'_>) -> Vec<Fragment> {
    let known = mentioned_entities(ctx)
        .into_iter()
        .take(ctx.config.top_n)
        .filter_map(|entity| {
            let metrics = ctx.store.metrics(entity.id()).ok()?;
            Some(Fragment::new(
                FragmentKind::EntitySummary,
                entity_summary(entity, metrics),
            ))
        });
    let unknown = unknown_entity_ids(ctx).into_iter().map(|word| {
        Fragment::new(
            FragmentKind::NotAvailable,
            unknown_entity(&word.to_uppercase()),
        )
    });
    known.chain(unknown).collect()
}

/// Entities below the health threshold, weakest first, followed by the
/// entities raising risk alerts.
fn select_risk(ctx: &RuleContext<'_>) -> Vec<Fragment> {
    let threshold = ctx.config.risk_threshold;
    let mut weak: Vec<(&Entity, &MetricSet, f64)> = ctx
        .store
        .all_metrics()
        .filter_map(|(e, m)| m.health_score.map(|s| (e, m, s)))
        .filter(|(_, _, score)| *score < threshold)
        .collect();
    weak.sort_by(|a, b| {
        a.2.partial_cmp(&b.2)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id().cmp(b.0.id()))
    });

    let mut text = format!(
        "Entities with health score below {:.0} (lowest first):",
        threshold
    );
    if weak.is_empty() {
        text.push_str("\n- none");
    }
    for (entity, metrics, score) in weak.iter().take(ctx.config.top_n) {
        text.push_str(&format!(
            "\n- {}: health {:.1}, runway {}, burn rate {}",
            entity.id(),
            score,
            or_not_available(metrics.runway),
            or_not_available(metrics.burn_rate.map(|b| format!("{}/month", brl(b))))
        ));
    }
    let mut fragments = vec![Fragment::new(FragmentKind::RiskRanking, text)];

    let alerted: Vec<String> = ctx
        .store
        .all_metrics()
        .filter(|(_, m)| !m.alerts.is_empty())
        .take(ctx.config.top_n)
        .map(|(e, m)| {
            let alerts: Vec<String> = m.alerts.iter().map(|a| a.to_string()).collect();
            format!("\n- {}: {}", e.id(), alerts.join(", "))
        })
        .collect();
    if !alerted.is_empty() {
        fragments.push(Fragment::new(
            FragmentKind::RiskRanking,
            format!("Risk alerts:{}", alerted.concat()),
        ));
    }
    fragments
}

/// Entities with transactions ranked by HHI, most concentrated first.
fn select_concentration(ctx: &RuleContext<'_>) -> Vec<Fragment> {
    let mut ranked: Vec<(&Entity, &MetricSet)> = ctx
        .store
        .all_metrics()
        .filter(|(_, m)| m.concentration.transactions > 0)
        .collect();
    ranked.sort_by(|a, b| {
        b.1.hhi()
            .partial_cmp(&a.1.hhi())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id().cmp(b.0.id()))
    });

    let mut text = String::from("Entities ranked by concentration (HHI, highest first):");
    if ranked.is_empty() {
        text.push_str("\n- not available (no transactions)");
    }
    for (entity, metrics) in ranked.iter().take(ctx.config.top_n) {
        let c = &metrics.concentration;
        text.push_str(&format!(
            "\n- {}: HHI {:.3} (payments {:.3}, receipts {:.3}), {} counterparties, dependency risk {}",
            entity.id(),
            c.hhi,
            c.payment_hhi,
            c.receipt_hhi,
            c.counterparties,
            or_not_available(
                metrics
                    .dependency_risk
                    .map(|d| format!("{:.1} ({})", d.score, d.level))
            )
        ));
    }
    vec![Fragment::new(FragmentKind::ConcentrationRanking, text)]
}

/// Growing entities by revenue trend, and the best credit scores.
fn select_growth(ctx: &RuleContext<'_>) -> Vec<Fragment> {
    let mut growing: Vec<(&Entity, f64)> = ctx
        .store
        .all_metrics()
        .filter(|(_, m)| m.lifecycle == Some(LifecycleStage::Growing))
        .filter_map(|(e, m)| m.revenue_trend.map(|t| (e, t)))
        .collect();
    growing.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id().cmp(b.0.id()))
    });
    let mut growth = String::from("Growing entities (revenue trend, highest first):");
    if growing.is_empty() {
        growth.push_str("\n- none");
    }
    for (entity, trend) in growing.iter().take(ctx.config.top_n) {
        growth.push_str(&format!(
            "\n- {}: {:+.1}% of mean revenue per month, current revenue {}",
            entity.id(),
            trend * 100.0,
            or_not_available(entity.current_revenue().map(brl))
        ));
    }

    let mut scored: Vec<(&Entity, &MetricSet, u8)> = ctx
        .store
        .all_metrics()
        .filter_map(|(e, m)| m.credit_score.map(|c| (e, m, c.total())))
        .collect();
    scored.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.id().cmp(b.0.id())));
    let mut credit = String::from("Best credit scores:");
    if scored.is_empty() {
        credit.push_str("\n- not available");
    }
    for (entity, metrics, _) in scored.iter().take(ctx.config.top_n) {
        credit.push_str(&format!(
            "\n- {}: {}, current balance {}",
            entity.id(),
            or_not_available(metrics.credit_score),
            or_not_available(metrics.current_balance.map(brl))
        ));
    }

    vec![
        Fragment::new(FragmentKind::GrowthRanking, growth),
        Fragment::new(FragmentKind::CreditRanking, credit),
        revenue_ranking(ctx.store, ctx.config.top_n),
    ]
}

/// Neighborhood of the focus entity, or the largest flows overall with the
/// volume per settlement rail.
fn select_relationships(ctx: &RuleContext<'_>) -> Vec<Fragment> {
    if let Some(focus) = ctx.focus {
        return vec![neighborhood_fragment(
            focus,
            ctx.store,
            ctx.graph,
            ctx.config.neighbor_limit,
        )];
    }
    let flows = ctx.graph.top_flows(ctx.config.top_n);
    let mut text = format!(
        "Largest money flows ({} flows between {} entities, total {}):",
        ctx.graph.edge_count(),
        ctx.graph.node_count(),
        brl(ctx.graph.total_volume())
    );
    if flows.is_empty() {
        text.push_str("\n- none");
    }
    for flow in flows {
        text.push_str(&format!(
            "\n- {} -> {}: {} in {} transactions",
            flow.payer,
            flow.payee,
            brl(flow.amount),
            flow.count
        ));
    }
    text.push_str(&format!(
        "\nVolume by transaction kind: {}",
        kind_breakdown(ctx.store.transactions())
    ));
    vec![Fragment::new(FragmentKind::TopFlows, text)]
}

/// Entity count per lifecycle stage.
fn select_lifecycle(ctx: &RuleContext<'_>) -> Vec<Fragment> {
    let mut counts: BTreeMap<LifecycleStage, usize> = BTreeMap::new();
    let mut unknown = 0;
    for (_, metrics) in ctx.store.all_metrics() {
        match metrics.lifecycle {
            Some(stage) => *counts.entry(stage).or_default() += 1,
            None => unknown += 1,
        }
    }
    let mut text = String::from("Lifecycle stage distribution:");
    for stage in LifecycleStage::ALL {
        text.push_str(&format!(
            "\n- {}: {}",
            stage,
            counts.get(&stage).copied().unwrap_or(0)
        ));
    }
    if unknown > 0 {
        text.push_str(&format!("\n- not available: {}", unknown));
    }
    vec![Fragment::new(FragmentKind::LifecycleDistribution, text)]
}

/// Summary of each sector named in the query.
fn select_sectors(ctx: &RuleContext<'_>) -> Vec<Fragment> {
    mentioned_sectors(ctx)
        .into_iter()
        .map(|sector| {
            let members: Vec<(&Entity, &MetricSet)> = ctx
                .store
                .all_metrics()
                .filter(|(e, _)| e.sector().as_str() == sector)
                .collect();
            let revenues: Vec<Decimal> = members
                .iter()
                .filter_map(|(e, _)| e.current_revenue())
                .collect();
            let scores: Vec<f64> = members.iter().filter_map(|(_, m)| m.health_score).collect();

            let mean_revenue = (!revenues.is_empty()).then(|| money::mean(&revenues));
            let mean_health = (!scores.is_empty())
                .then(|| scores.iter().sum::<f64>() / scores.len() as f64);
            let ids: Vec<&str> = members
                .iter()
                .take(ctx.config.top_n)
                .map(|(e, _)| e.id().as_str())
                .collect();

            Fragment::new(
                FragmentKind::SectorSummary,
                format!(
                    "Sector {}: {} entities, mean current revenue {}, mean health score {}, entities: {}",
                    sector,
                    members.len(),
                    or_not_available(mean_revenue.map(brl)),
                    or_not_available(mean_health.map(|h| format!("{:.1}", h))),
                    ids.join(", ")
                ),
            )
        })
        .collect()
}

/// Counterparties of `entity` in both directions, largest first, then its
/// top payments and top receipts separately and its volume per
/// settlement rail.
pub fn neighborhood_fragment(
    entity: &EntityId,
    store: &EntityStore,
    graph: &RelationshipGraph,
    limit: usize,
) -> Fragment {
    let neighbors = graph.neighbors(entity, FlowDirection::Both);
    if neighbors.is_empty() {
        return Fragment::new(
            FragmentKind::Neighborhood,
            format!("Relationships of {}: no transactions", entity),
        );
    }
    let mut text = neighborhood(entity.as_str(), top(&neighbors, limit), neighbors.len());
    for (title, direction) in [
        ("Top payments (paid to)", FlowDirection::Outgoing),
        ("Top receipts (received from)", FlowDirection::Incoming),
    ] {
        let side = graph.neighbors(entity, direction);
        text.push('\n');
        text.push_str(&flow_section(title, top(&side, limit)));
    }
    if let Ok(transactions) = store.transactions_for(entity) {
        text.push_str(&format!(
            "\nTransactions by kind: {}",
            kind_breakdown(transactions)
        ));
    }
    Fragment::new(FragmentKind::Neighborhood, text)
}

fn top<T>(items: &[T], limit: usize) -> &[T] {
    &items[..items.len().min(limit)]
}

/// Entity count per sector, largest first, ties by name.
pub fn sector_distribution(store: &EntityStore, limit: usize) -> Fragment {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entity in store.all() {
        *counts.entry(entity.sector().as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut text = format!("Top {} sectors by number of entities:", ranked.len().min(limit));
    for (sector, count) in ranked.into_iter().take(limit) {
        text.push_str(&format!("\n- {}: {}", sector, count));
    }
    Fragment::new(FragmentKind::SectorDistribution, text)
}

/// Largest current revenues, ties by id. Entities without a reported
/// month are left out.
pub fn revenue_ranking(store: &EntityStore, limit: usize) -> Fragment {
    let mut ranked: Vec<(&Entity, Decimal)> = store
        .all()
        .iter()
        .filter_map(|e| e.current_revenue().map(|r| (e, r)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id().cmp(b.0.id())));

    let mut text = String::from("Top entities by current revenue:");
    if ranked.is_empty() {
        text.push_str("\n- not available");
    }
    for (entity, revenue) in ranked.into_iter().take(limit) {
        text.push_str(&format!(
            "\n- {}: {}, sector {}",
            entity.id(),
            brl(revenue),
            entity.sector()
        ));
    }
    Fragment::new(FragmentKind::RevenueRanking, text)
}

/// Healthiest entities, highest score first.
pub fn health_ranking(store: &EntityStore, limit: usize) -> Fragment {
    let mut scored: Vec<(&Entity, &MetricSet, f64)> = store
        .all_metrics()
        .filter_map(|(e, m)| m.health_score.map(|s| (e, m, s)))
        .collect();
    scored.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id().cmp(b.0.id()))
    });

    let mut text = String::from("Top entities by health score:");
    if scored.is_empty() {
        text.push_str("\n- not available");
    }
    for (entity, metrics, score) in scored.into_iter().take(limit) {
        text.push_str(&format!(
            "\n- {}: {:.1} ({}), sector {}, lifecycle {}",
            entity.id(),
            score,
            metrics
                .health_band()
                .map(|b| b.to_string())
                .unwrap_or_default(),
            entity.sector(),
            or_not_available(metrics.lifecycle)
        ));
    }
    Fragment::new(FragmentKind::HealthRanking, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_hits() {
        assert_eq!(keyword_hits("quais empresas têm alta concentração", CONCENTRATION_TERMS), 1);
        assert_eq!(keyword_hits("qual o risco de liquidez", RISK_TERMS), 2);
        assert_eq!(keyword_hits("bom dia", RISK_TERMS), 0);
        assert_eq!(keyword_hits("quais os riscos?", RISK_TERMS), 1);
    }

    #[test]
    fn test_keyword_inside_word_is_ignored() {
        assert_eq!(keyword_hits("credenciamento de lojistas", RELATIONSHIP_TERMS), 0);
        assert_eq!(keyword_hits("a rede de lojistas", RELATIONSHIP_TERMS), 1);
        assert_eq!(keyword_hits("overburn", RISK_TERMS), 0);
    }

    #[test]
    fn test_looks_like_entity_id() {
        assert!(looks_like_entity_id("cnpj_00042"));
        assert!(looks_like_entity_id("12345678000199"));
        assert!(!looks_like_entity_id("cnpj_"));
        assert!(!looks_like_entity_id("cnpj"));
        assert!(!looks_like_entity_id("2025"));
    }

    #[test]
    fn test_contains_token() {
        assert!(contains_token("fale sobre cnpj_001.", "cnpj_001"));
        assert!(!contains_token("fale sobre cnpj_0012", "cnpj_001"));
        assert!(!contains_token("xa", "a"));
        assert!(contains_token("a", "a"));
        assert!(!contains_token("anything", ""));
    }

    #[test]
    fn test_rule_table_covers_every_class() {
        let classes = [
            KeywordClass::Risk,
            KeywordClass::Concentration,
            KeywordClass::Growth,
            KeywordClass::Relationships,
            KeywordClass::Lifecycle,
            KeywordClass::Sector,
            KeywordClass::EntityId,
        ];
        for class in classes {
            assert_eq!(RULES.iter().filter(|r| r.class == class).count(), 1, "{}", class);
        }
    }
}
