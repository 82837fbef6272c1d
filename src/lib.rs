//! # cnpj-insight
//!
//! Portfolio metrics and context retrieval for questions about a bank's
//! corporate clients (CNPJs).
//!
//! Monthly company snapshots and inter-company transactions are loaded
//! into a validated store. Per-entity financial health metrics are
//! derived lazily, a money-flow graph links the entities, and a bounded,
//! traceable text context is assembled for a question answered by an
//! external language model.
//!
//! ## Architecture
//!
//! - **core**: Entities, transactions, validated records, errors and the entity store
//! - **ingest**: `;`-separated CSV readers and writers
//! - **metrics**: Concentration, burn rate, runway, health, lifecycle and credit scoring
//! - **graph**: Directed relationship graph of money flows
//! - **retrieval**: Keyword rule table and size-bounded context bundles
//! - **assistant**: Prompt assembly, language model boundary and conversation history
//! - **simulation**: Synthetic portfolios for demos and benchmarks

pub mod assistant;
pub mod core;
pub mod graph;
pub mod ingest;
pub mod metrics;
pub mod retrieval;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::assistant::llm::{ChatConfig, LanguageModel, OpenAiChat};
    pub use crate::assistant::session::Assistant;
    pub use crate::core::entity::{Entity, EntityId, Month, ReportingWindow};
    pub use crate::core::error::{DataIntegrityError, Error, NotFoundError};
    pub use crate::core::store::EntityStore;
    pub use crate::graph::relationship_graph::{FlowDirection, RelationshipGraph};
    pub use crate::metrics::engine::{MetricSet, MetricsEngine};
    pub use crate::retrieval::bundle::ContextBundle;
    pub use crate::retrieval::retriever::{ContextRetriever, RetrievalConfig, RetrievalLimits};
}
