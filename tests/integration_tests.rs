use cnpj_insight::core::entity::{EntityId, Month, ReportingWindow};
use cnpj_insight::core::error::DataIntegrityError;
use cnpj_insight::core::records::{CompanyRecord, TransactionRecord};
use cnpj_insight::core::store::EntityStore;
use cnpj_insight::core::transaction::TransactionKind;
use cnpj_insight::graph::relationship_graph::{FlowDirection, RelationshipGraph};
use cnpj_insight::ingest::csv_files::{
    read_companies, read_transactions, write_companies, write_transactions,
};
use cnpj_insight::metrics::liquidity::{RiskAlert, Runway};
use cnpj_insight::metrics::trend::LifecycleStage;
use cnpj_insight::retrieval::bundle::{FragmentKind, NO_DATA};
use cnpj_insight::retrieval::retriever::{ContextRetriever, RetrievalLimits};
use cnpj_insight::simulation::synthetic::{generate_portfolio, PortfolioConfig};
use approx::assert_relative_eq;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const COMPANIES: &str = "\
ID;DT_REFE;VL_FATU;VL_SLDO;DS_CNAE
E007;2025-01-31;1000;100;Varejo
E007;2025-02-28;1000;80;Varejo
E007;2025-03-31;1000;60;Varejo
E007;2025-04-30;1000;40;Varejo
E007;2025-05-31;1000;20;Varejo
X1;2025-01-31;500;10;Industria
X1;2025-02-28;500;10;Industria
X2;2025-01-31;800;30;Industria
X2;2025-02-28;800;35;Industria
X3;2025-01-31;1.2e3;5;Transporte
X3;2025-02-28;1.2e3;6;Transporte
";

const TRANSACTIONS: &str = "\
ID_PGTO;ID_RCBE;VL;DS_TRAN;DT_REFE
E007;X1;50;PIX;2025-01-10
E007;X2;30;TED;2025-02-11
E007;X3;20;BOLETO;2025-03-12
X1;X2;5;SISTEMICO;2025-01-20
";

fn load() -> EntityStore {
    let companies = read_companies(COMPANIES.as_bytes()).unwrap();
    let transactions = read_transactions(TRANSACTIONS.as_bytes()).unwrap();
    EntityStore::load(companies, transactions).unwrap()
}

/// CSV → store → metrics → graph → context.
#[test]
fn full_pipeline_linear_burn_entity() {
    let store = load();
    assert_eq!(store.len(), 4);
    assert_eq!(store.transactions().len(), 4);

    let id = EntityId::new("E007");
    let metrics = store.metrics(&id).unwrap();
    assert_eq!(metrics.burn_rate, Some(dec!(-20)));
    assert_eq!(metrics.runway, Some(Runway::Months(1)));
    assert_relative_eq!(metrics.hhi(), 0.38, epsilon = 1e-12);
    assert_eq!(metrics.concentration.counterparties, 3);
    assert_eq!(metrics.lifecycle, Some(LifecycleStage::Mature));
    assert!(metrics.alerts.contains(&RiskAlert::ShortRunway));
    let health = metrics.health_score.unwrap();
    assert!((0.0..=100.0).contains(&health));
    assert!(metrics.credit_score.is_some());

    let graph = RelationshipGraph::build(store.transactions());
    let out = graph.neighbors(&id, FlowDirection::Outgoing);
    let order: Vec<&str> = out.iter().map(|n| n.counterparty.as_str()).collect();
    assert_eq!(order, vec!["X1", "X2", "X3"]);

    let bundle = ContextRetriever::default().retrieve(
        "como está a E007?",
        Some(&id),
        &store,
        &graph,
        RetrievalLimits::default(),
    );
    let first = &bundle.fragments()[0];
    assert_eq!(first.kind, FragmentKind::EntitySummary);
    assert!(first.text.contains("- runway: 1 month"));
    assert!(first.text.contains("- burn rate: -R$ 20,00/month"));
}

#[test]
fn metrics_are_cached_until_reload() {
    let mut store = load();
    let id = EntityId::new("X1");
    let before = store.metrics(&id).unwrap() as *const _;
    let again = store.metrics(&id).unwrap() as *const _;
    assert_eq!(before, again);

    store
        .reload(
            vec![
                CompanyRecord::new("X1", Month::new(2025, 1).unwrap(), dec!(1), dec!(100), "Varejo"),
                CompanyRecord::new("X1", Month::new(2025, 2).unwrap(), dec!(1), dec!(150), "Varejo"),
            ],
            vec![],
        )
        .unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.metrics(&id).unwrap().burn_rate, Some(dec!(50)));
}

#[test]
fn concentration_question_ranks_by_hhi() {
    let store = load();
    let graph = RelationshipGraph::build(store.transactions());
    let bundle = ContextRetriever::default().retrieve(
        "quais empresas têm alta concentração",
        None,
        &store,
        &graph,
        RetrievalLimits::default(),
    );

    let ranking = bundle
        .fragments()
        .iter()
        .find(|f| f.kind == FragmentKind::ConcentrationRanking)
        .expect("concentration ranking fragment");

    let ids: Vec<&str> = ranking
        .text
        .lines()
        .skip(1)
        .filter_map(|line| line.strip_prefix("- "))
        .filter_map(|line| line.split(':').next())
        .collect();
    let hhi = |id: &str| store.metrics(&EntityId::new(id)).unwrap().hhi();
    assert_eq!(ids.len(), 4);
    for pair in ids.windows(2) {
        assert!(hhi(pair[0]) >= hhi(pair[1]), "{:?}", ids);
    }
    // X3 trades with E007 only.
    assert_eq!(ids[0], "X3");
}

#[test]
fn empty_dataset_yields_single_no_data_fragment() {
    let store = EntityStore::load(vec![], vec![]).unwrap();
    let graph = RelationshipGraph::build(store.transactions());
    let bundle = ContextRetriever::default().retrieve(
        "qual o risco da carteira?",
        None,
        &store,
        &graph,
        RetrievalLimits::default(),
    );
    assert_eq!(bundle.len(), 1);
    assert_eq!(bundle.fragments()[0].kind, FragmentKind::NoData);
    assert_eq!(bundle.render(), NO_DATA);
}

#[test]
fn missing_column_is_rejected() {
    let csv = "ID;DT_REFE;VL_FATU;DS_CNAE\nA;2025-01-31;10;Varejo\n";
    let err = read_companies(csv.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        DataIntegrityError::MissingColumn {
            column: "VL_SLDO",
            ..
        }
    ));
}

#[test]
fn unknown_transaction_party_is_rejected() {
    let companies = read_companies(COMPANIES.as_bytes()).unwrap();
    let transactions = vec![TransactionRecord::new(
        "E007",
        "GHOST",
        dec!(1),
        NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
        TransactionKind::Pix,
    )];
    let err = EntityStore::load(companies, transactions).unwrap_err();
    assert!(matches!(err, DataIntegrityError::UnknownEntity { .. }));
}

#[test]
fn failed_reload_keeps_previous_store() {
    let mut store = load();
    let gap = vec![
        CompanyRecord::new("A", Month::new(2025, 1).unwrap(), dec!(1), dec!(1), "Varejo"),
        CompanyRecord::new("A", Month::new(2025, 3).unwrap(), dec!(1), dec!(1), "Varejo"),
    ];
    assert!(store.reload(gap, vec![]).is_err());
    assert_eq!(store.len(), 4);
    assert!(store.contains(&EntityId::new("E007")));
}

#[test]
fn declared_window_rejects_outside_months() {
    let window = ReportingWindow::new(
        Month::new(2025, 2).unwrap(),
        Month::new(2025, 5).unwrap(),
    );
    let companies = read_companies(COMPANIES.as_bytes()).unwrap();
    let err = EntityStore::load_with_window(companies, vec![], window).unwrap_err();
    assert!(matches!(err, DataIntegrityError::OutsideWindow { .. }));
}

#[test]
fn written_files_read_back() {
    let portfolio = generate_portfolio(&PortfolioConfig {
        entity_count: 8,
        seed: Some(3),
        ..PortfolioConfig::default()
    });

    let mut companies = Vec::new();
    write_companies(&mut companies, &portfolio.companies).unwrap();
    let mut transactions = Vec::new();
    write_transactions(&mut transactions, &portfolio.transactions).unwrap();

    let companies = read_companies(companies.as_slice()).unwrap();
    let transactions = read_transactions(transactions.as_slice()).unwrap();
    assert_eq!(companies, portfolio.companies);
    assert_eq!(transactions, portfolio.transactions);

    let store = EntityStore::load(companies, transactions).unwrap();
    let graph = RelationshipGraph::build(store.transactions());
    let volume: Decimal = store.transactions().iter().map(|t| t.amount()).sum();
    assert_eq!(graph.total_volume(), volume);
}

#[test]
fn unsummable_transaction_file_is_rejected() {
    let transactions = "\
ID_PGTO;ID_RCBE;VL;DS_TRAN;DT_REFE
E007;X1;50000000000000000000000000000;PIX;2025-01-10
E007;X1;50000000000000000000000000000;PIX;2025-01-11
";
    let companies = read_companies(COMPANIES.as_bytes()).unwrap();
    let transactions = read_transactions(transactions.as_bytes()).unwrap();
    let err = EntityStore::load(companies, transactions).unwrap_err();
    assert!(matches!(
        err,
        DataIntegrityError::AmountOverflow {
            dataset: "transaction",
            row: 2,
            column: "VL"
        }
    ));
}
