use crate::core::entity::EntityId;
use crate::core::money;
use crate::core::transaction::Transaction;
use log::info;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Aggregate of all transactions from one entity to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub amount: Decimal,
    pub count: usize,
}

/// Which edges to follow from an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    /// Money received: counterparty pays the entity.
    Incoming,
    /// Money paid: the entity pays the counterparty.
    Outgoing,
    Both,
}

/// A counterparty and the aggregated flow with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub counterparty: EntityId,
    pub amount: Decimal,
    pub count: usize,
}

/// An aggregated (payer, payee) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub payer: EntityId,
    pub payee: EntityId,
    pub amount: Decimal,
    pub count: usize,
}

/// Directed, weighted graph of money flowing between entities.
///
/// Nodes are the entity ids that appear in at least one transaction.
/// Each edge aggregates every transaction of one ordered (payer, payee)
/// pair. The graph is built in one pass and never updated; rebuild it
/// when the transaction set changes.
///
/// # Examples
///
/// ```
/// use cnpj_insight::core::entity::EntityId;
/// use cnpj_insight::core::transaction::{Transaction, TransactionKind};
/// use cnpj_insight::graph::relationship_graph::{FlowDirection, RelationshipGraph};
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
/// let txs = vec![
///     Transaction::new("A".into(), "B".into(), dec!(100), day, TransactionKind::Pix),
///     Transaction::new("A".into(), "B".into(), dec!(50), day, TransactionKind::Ted),
/// ];
/// let graph = RelationshipGraph::build(&txs);
///
/// let out = graph.neighbors(&EntityId::new("A"), FlowDirection::Outgoing);
/// assert_eq!(out[0].amount, dec!(150));
/// assert_eq!(out[0].count, 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    graph: DiGraph<EntityId, FlowEdge>,
    nodes: HashMap<EntityId, NodeIndex>,
}

impl RelationshipGraph {
    /// Aggregate transactions by ordered (payer, payee) pair.
    pub fn build<'a, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut pairs: BTreeMap<(EntityId, EntityId), FlowEdge> = BTreeMap::new();
        for tx in transactions {
            let edge = pairs
                .entry((tx.payer().clone(), tx.payee().clone()))
                .or_insert(FlowEdge {
                    amount: Decimal::ZERO,
                    count: 0,
                });
            edge.amount = edge.amount.saturating_add(tx.amount());
            edge.count += 1;
        }

        let mut graph = DiGraph::new();
        let mut nodes: HashMap<EntityId, NodeIndex> = HashMap::new();
        for ((payer, payee), edge) in pairs {
            let from = *nodes
                .entry(payer.clone())
                .or_insert_with(|| graph.add_node(payer));
            let to = *nodes
                .entry(payee.clone())
                .or_insert_with(|| graph.add_node(payee));
            graph.add_edge(from, to, edge);
        }

        info!(
            "built relationship graph: {} entities, {} flows",
            graph.node_count(),
            graph.edge_count()
        );
        Self { graph, nodes }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, entity: &EntityId) -> bool {
        self.nodes.contains_key(entity)
    }

    /// All node ids, ascending.
    pub fn entities(&self) -> Vec<&EntityId> {
        let mut ids: Vec<&EntityId> = self.nodes.keys().collect();
        ids.sort();
        ids
    }

    /// Aggregated flow from `payer` to `payee`, if any.
    pub fn edge(&self, payer: &EntityId, payee: &EntityId) -> Option<FlowEdge> {
        let from = *self.nodes.get(payer)?;
        let to = *self.nodes.get(payee)?;
        self.graph
            .find_edge(from, to)
            .map(|e| self.graph[e])
    }

    /// Sum of all edge amounts.
    pub fn total_volume(&self) -> Decimal {
        money::total(self.graph.edge_weights().map(|e| e.amount))
    }

    /// Counterparties of `entity`, largest aggregate amount first; equal
    /// amounts are ordered by counterparty id ascending.
    ///
    /// With [`FlowDirection::Both`] the flows in each direction are summed
    /// per counterparty. Entities without transactions have no neighbors.
    pub fn neighbors(&self, entity: &EntityId, direction: FlowDirection) -> Vec<Neighbor> {
        let Some(&node) = self.nodes.get(entity) else {
            return Vec::new();
        };

        let mut merged: BTreeMap<&EntityId, FlowEdge> = BTreeMap::new();
        let mut collect = |dir: Direction| {
            for edge in self.graph.edges_directed(node, dir) {
                let other = match dir {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                let slot = merged.entry(&self.graph[other]).or_insert(FlowEdge {
                    amount: Decimal::ZERO,
                    count: 0,
                });
                slot.amount = slot.amount.saturating_add(edge.weight().amount);
                slot.count += edge.weight().count;
            }
        };
        match direction {
            FlowDirection::Incoming => collect(Direction::Incoming),
            FlowDirection::Outgoing => collect(Direction::Outgoing),
            FlowDirection::Both => {
                collect(Direction::Incoming);
                collect(Direction::Outgoing);
            }
        }

        let mut neighbors: Vec<Neighbor> = merged
            .into_iter()
            .map(|(id, flow)| Neighbor {
                counterparty: id.clone(),
                amount: flow.amount,
                count: flow.count,
            })
            .collect();
        neighbors.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then_with(|| a.counterparty.cmp(&b.counterparty))
        });
        neighbors
    }

    /// The `n` largest flows, ties ordered by (payer, payee).
    pub fn top_flows(&self, n: usize) -> Vec<Flow> {
        let mut flows: Vec<Flow> = self
            .graph
            .edge_references()
            .map(|e| Flow {
                payer: self.graph[e.source()].clone(),
                payee: self.graph[e.target()].clone(),
                amount: e.weight().amount,
                count: e.weight().count,
            })
            .collect();
        flows.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then_with(|| a.payer.cmp(&b.payer))
                .then_with(|| a.payee.cmp(&b.payee))
        });
        flows.truncate(n);
        flows
    }
}
