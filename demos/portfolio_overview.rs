//! Portfolio overview example.
//!
//! Generates a synthetic portfolio, prints the healthiest and weakest
//! entities, the largest money flows, and the context bundles that would
//! be sent to a language model for a few questions. The model is replaced
//! by an offline echo so the example runs without network access.

use cnpj_insight::assistant::llm::{CollaboratorError, LanguageModel};
use cnpj_insight::assistant::prompt::Prompt;
use cnpj_insight::prelude::*;
use cnpj_insight::retrieval::format::{brl, or_not_available};
use cnpj_insight::simulation::synthetic::{generate_portfolio, PortfolioConfig};

/// Answers with the size of the context it was given.
struct OfflineEcho;

impl LanguageModel for OfflineEcho {
    fn complete(&self, prompt: &Prompt) -> Result<String, CollaboratorError> {
        Ok(format!(
            "(offline) received {} characters of context for: {}",
            prompt.context.chars().count(),
            prompt.question
        ))
    }
}

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  cnpj-insight: Portfolio Overview        ║");
    println!("╚══════════════════════════════════════════╝\n");

    let config = PortfolioConfig {
        entity_count: 40,
        months: 6,
        seed: Some(2025),
        ..PortfolioConfig::default()
    };
    let store = match generate_portfolio(&config).into_store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("generated portfolio rejected: {}", e);
            return;
        }
    };
    let graph = RelationshipGraph::build(store.transactions());

    // --- Health ranking ---
    println!("━━━ Health Ranking ━━━\n");

    let mut ranked: Vec<(&Entity, &MetricSet)> = store
        .all_metrics()
        .filter(|(_, m)| m.health_score.is_some())
        .collect();
    ranked.sort_by(|a, b| {
        let score = |m: &MetricSet| m.health_score.unwrap_or_default();
        score(b.1).total_cmp(&score(a.1))
    });

    let show = |(entity, metrics): &(&Entity, &MetricSet)| {
        println!(
            "  {:<12} {:>6.1}  runway {:<12} burn {:>18}  HHI {:.3}",
            entity.id(),
            metrics.health_score.unwrap_or_default(),
            or_not_available(metrics.runway),
            or_not_available(metrics.burn_rate.map(brl)),
            metrics.hhi()
        );
    };
    println!("Top 5:");
    ranked.iter().take(5).for_each(show);
    println!("\nBottom 5:");
    ranked.iter().rev().take(5).for_each(show);
    println!();

    // --- Money flows ---
    println!("━━━ Largest Flows ━━━\n");
    println!(
        "{} entities, {} flows, total {}\n",
        graph.node_count(),
        graph.edge_count(),
        brl(graph.total_volume())
    );
    for flow in graph.top_flows(5) {
        println!(
            "  {} → {}: {} ({} transactions)",
            flow.payer,
            flow.payee,
            brl(flow.amount),
            flow.count
        );
    }
    println!();

    // --- Question answering ---
    println!("━━━ Questions ━━━\n");

    let mut assistant = Assistant::new(OfflineEcho).with_retriever(
        ContextRetriever::default(),
        RetrievalLimits {
            max_fragments: 6,
            max_chars: 1500,
        },
    );
    let focus = ranked.last().map(|(entity, _)| entity.id().clone());
    let questions: [(&str, Option<&EntityId>); 3] = [
        ("quais empresas têm maior risco de liquidez?", None),
        ("quem depende de poucos fornecedores? concentração alta", None),
        ("como está esta empresa e com quem ela transaciona?", focus.as_ref()),
    ];

    for (question, focus) in questions {
        let prompt = assistant.prepare(question, focus, &store, &graph);
        println!("Q: {}", question);
        println!("{}\n", prompt.context);
        match assistant.ask(question, focus, &store, &graph) {
            Ok(answer) => println!("A: {}\n", answer),
            Err(e) => println!("A: failed ({})\n", e),
        }
    }
    println!("{} exchanges in history", assistant.history().count());
}
