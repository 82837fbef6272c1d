//! cnpj-insight CLI
//!
//! Inspect portfolio metrics and ask questions about the loaded CNPJs.
//!
//! # Usage
//!
//! ```bash
//! # Metrics of every entity, or of one
//! cnpj-insight metrics --companies base_info.csv --transactions transacoes.csv
//! cnpj-insight metrics --entity CNPJ_00007 --format json
//!
//! # Counterparties of an entity, or the largest flows
//! cnpj-insight graph --entity CNPJ_00007 --direction outgoing
//!
//! # Context that would be sent to the language model
//! cnpj-insight context "quais empresas têm alta concentração?"
//!
//! # Ask the language model (needs OPENAI_API_KEY)
//! cnpj-insight ask "qual CNPJ tem maior risco de liquidez?"
//!
//! # Write a synthetic dataset
//! cnpj-insight generate --entities 100 --seed 7 --output-dir data
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use cnpj_insight::assistant::llm::{ChatConfig, OpenAiChat};
use cnpj_insight::assistant::session::Assistant;
use cnpj_insight::core::entity::{Entity, EntityId};
use cnpj_insight::core::error::Error;
use cnpj_insight::core::store::EntityStore;
use cnpj_insight::graph::relationship_graph::{FlowDirection, RelationshipGraph};
use cnpj_insight::ingest::csv_files::{load_store, write_companies, write_transactions};
use cnpj_insight::metrics::engine::MetricSet;
use cnpj_insight::retrieval::format::{brl, entity_summary};
use cnpj_insight::retrieval::retriever::{ContextRetriever, RetrievalConfig, RetrievalLimits};
use cnpj_insight::simulation::synthetic::{generate_portfolio, PortfolioConfig};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cnpj-insight")]
#[command(about = "Portfolio metrics and question answering over bank CNPJ data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the derived metrics of every entity, or of one
    Metrics {
        #[command(flatten)]
        data: DataArgs,
        /// Only this entity
        #[arg(long)]
        entity: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Show the counterparties of an entity, or the largest money flows
    Graph {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        entity: Option<String>,
        #[arg(long, value_enum, default_value_t = Direction::Both)]
        direction: Direction,
        /// Rows to show
        #[arg(long, default_value = "10")]
        top: usize,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Print the context bundle assembled for a question
    Context {
        question: String,
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Answer a question with the language model
    Ask {
        question: String,
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
        #[command(flatten)]
        chat: ChatArgs,
    },
    /// Write a synthetic companies/transactions dataset
    Generate {
        #[arg(long, default_value = "50")]
        entities: usize,
        #[arg(long, default_value = "5")]
        months: usize,
        /// Average transactions paid by each entity
        #[arg(long, default_value = "8")]
        transactions_per_entity: usize,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Company snapshots (ID;DT_REFE;VL_FATU;VL_SLDO;DS_CNAE)
    #[arg(long, env = "CNPJ_COMPANIES_CSV", default_value = "companies.csv")]
    companies: PathBuf,
    /// Transactions (ID_PGTO;ID_RCBE;VL;DS_TRAN;DT_REFE)
    #[arg(long, env = "CNPJ_TRANSACTIONS_CSV", default_value = "transactions.csv")]
    transactions: PathBuf,
}

impl DataArgs {
    fn load(&self) -> Result<EntityStore, Error> {
        Ok(load_store(&self.companies, &self.transactions)?)
    }
}

#[derive(Args, Debug)]
struct RetrievalArgs {
    /// Entity the question is about
    #[arg(long)]
    entity: Option<String>,
    #[arg(long, default_value = "12")]
    max_fragments: usize,
    #[arg(long, default_value = "8000")]
    max_chars: usize,
    /// Rows per ranking
    #[arg(long, default_value = "10")]
    top_n: usize,
    /// Health score under which an entity counts as at risk
    #[arg(long, default_value = "50")]
    risk_threshold: f64,
}

impl RetrievalArgs {
    fn retriever(&self) -> ContextRetriever {
        ContextRetriever::new(RetrievalConfig {
            top_n: self.top_n,
            risk_threshold: self.risk_threshold,
            ..RetrievalConfig::default()
        })
    }

    fn limits(&self) -> RetrievalLimits {
        RetrievalLimits {
            max_fragments: self.max_fragments,
            max_chars: self.max_chars,
        }
    }

    fn focus(&self) -> Option<EntityId> {
        self.entity.as_deref().map(EntityId::new)
    }
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4")]
    model: String,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Direction {
    Incoming,
    Outgoing,
    Both,
}

impl From<Direction> for FlowDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Incoming => FlowDirection::Incoming,
            Direction::Outgoing => FlowDirection::Outgoing,
            Direction::Both => FlowDirection::Both,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Metrics {
            data,
            entity,
            format,
        } => cmd_metrics(&data.load()?, entity.as_deref(), format),
        Command::Graph {
            data,
            entity,
            direction,
            top,
            format,
        } => cmd_graph(&data.load()?, entity.as_deref(), direction.into(), top, format),
        Command::Context {
            question,
            data,
            retrieval,
            format,
        } => {
            let store = data.load()?;
            let graph = RelationshipGraph::build(store.transactions());
            let bundle = retrieval.retriever().retrieve(
                &question,
                retrieval.focus().as_ref(),
                &store,
                &graph,
                retrieval.limits(),
            );
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&bundle)?),
                Format::Text => println!("{}", bundle),
            }
            Ok(())
        }
        Command::Ask {
            question,
            data,
            retrieval,
            chat,
        } => {
            let store = data.load()?;
            let graph = RelationshipGraph::build(store.transactions());
            let model = OpenAiChat::new(ChatConfig {
                base_url: chat.base_url,
                model: chat.model,
                api_key: chat.api_key,
                timeout: Duration::from_secs(chat.timeout_secs),
                ..ChatConfig::default()
            })?;
            let mut assistant =
                Assistant::new(model).with_retriever(retrieval.retriever(), retrieval.limits());
            let answer = assistant.ask(&question, retrieval.focus().as_ref(), &store, &graph)?;
            println!("{}", answer);
            Ok(())
        }
        Command::Generate {
            entities,
            months,
            transactions_per_entity,
            seed,
            output_dir,
        } => cmd_generate(
            &PortfolioConfig {
                entity_count: entities,
                months,
                transactions_per_entity,
                seed,
                ..PortfolioConfig::default()
            },
            &output_dir,
        ),
    }
}

fn cmd_metrics(store: &EntityStore, entity: Option<&str>, format: Format) -> Result<(), Error> {
    let selected: Vec<(&Entity, &MetricSet)> = match entity {
        Some(id) => {
            let id = EntityId::new(id);
            vec![(store.get(&id)?, store.metrics(&id)?)]
        }
        None => store.all_metrics().collect(),
    };

    match format {
        Format::Json => {
            let sets: Vec<&MetricSet> = selected.iter().map(|(_, m)| *m).collect();
            println!("{}", serde_json::to_string_pretty(&sets)?);
        }
        Format::Text => {
            for (entity, metrics) in &selected {
                println!("{}\n", entity_summary(entity, metrics));
            }
            if entity.is_none() {
                println!("{} entities", selected.len());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct FlowOutput {
    payer: String,
    payee: String,
    amount: String,
    count: usize,
}

fn cmd_graph(
    store: &EntityStore,
    entity: Option<&str>,
    direction: FlowDirection,
    top: usize,
    format: Format,
) -> Result<(), Error> {
    let graph = RelationshipGraph::build(store.transactions());

    let Some(id) = entity else {
        let flows = graph.top_flows(top);
        match format {
            Format::Json => {
                let output: Vec<FlowOutput> = flows
                    .iter()
                    .map(|f| FlowOutput {
                        payer: f.payer.to_string(),
                        payee: f.payee.to_string(),
                        amount: f.amount.to_string(),
                        count: f.count,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Format::Text => {
                println!(
                    "{} entities, {} flows, total {}",
                    graph.node_count(),
                    graph.edge_count(),
                    brl(graph.total_volume())
                );
                for f in flows {
                    println!(
                        "  {} → {}: {} ({} transactions)",
                        f.payer,
                        f.payee,
                        brl(f.amount),
                        f.count
                    );
                }
            }
        }
        return Ok(());
    };

    let id = EntityId::new(id);
    store.get(&id)?;
    let neighbors = graph.neighbors(&id, direction);
    let shown = &neighbors[..neighbors.len().min(top)];
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(shown)?),
        Format::Text => {
            println!("{}: {} counterparties", id, neighbors.len());
            for n in shown {
                println!(
                    "  {}: {} ({} transactions)",
                    n.counterparty,
                    brl(n.amount),
                    n.count
                );
            }
        }
    }
    Ok(())
}

fn cmd_generate(config: &PortfolioConfig, output_dir: &Path) -> Result<(), Error> {
    let portfolio = generate_portfolio(config);

    let companies = output_dir.join("companies.csv");
    create(&companies)
        .and_then(|f| write_companies(f, &portfolio.companies))
        .map_err(|source| Error::Output {
            path: companies.display().to_string(),
            source,
        })?;

    let transactions = output_dir.join("transactions.csv");
    create(&transactions)
        .and_then(|f| write_transactions(f, &portfolio.transactions))
        .map_err(|source| Error::Output {
            path: transactions.display().to_string(),
            source,
        })?;

    info!("wrote {} and {}", companies.display(), transactions.display());
    eprintln!(
        "Generated {} company rows and {} transactions → {}",
        portfolio.companies.len(),
        portfolio.transactions.len(),
        output_dir.display()
    );
    Ok(())
}

fn create(path: &Path) -> csv::Result<File> {
    Ok(File::create(path)?)
}
