use crate::core::entity::{EntityId, Month, SectorCode};
use rust_decimal::Decimal;
use thiserror::Error;

/// Malformed or inconsistent input. Fatal to loading: no partial store is built.
#[derive(Debug, Error)]
pub enum DataIntegrityError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {dataset} dataset: {source}")]
    Csv {
        dataset: &'static str,
        #[source]
        source: csv::Error,
    },
    #[error("{dataset} dataset is missing required column {column}")]
    MissingColumn {
        dataset: &'static str,
        column: &'static str,
    },
    #[error("{dataset} dataset, row {row}: invalid {column} value {value:?}")]
    InvalidValue {
        dataset: &'static str,
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("blank entity id in {dataset} dataset, row {row}")]
    BlankId { dataset: &'static str, row: usize },
    #[error("transaction {row} references unknown entity {entity}")]
    UnknownEntity { row: usize, entity: EntityId },
    #[error("transaction {row} has negative amount {amount}")]
    NegativeAmount { row: usize, amount: Decimal },
    #[error("transaction {row} has {entity} paying itself")]
    SelfTransfer { row: usize, entity: EntityId },
    #[error("{dataset} dataset, row {row}: {column} values add up beyond the representable range")]
    AmountOverflow {
        dataset: &'static str,
        row: usize,
        column: &'static str,
    },
    #[error("entity {entity} reports sector \"{found}\" but earlier rows say \"{expected}\"")]
    SectorMismatch {
        entity: EntityId,
        expected: SectorCode,
        found: SectorCode,
    },
    #[error("entity {entity} reports month {month} more than once")]
    DuplicateMonth { entity: EntityId, month: Month },
    #[error("entity {entity} has no snapshot for {missing} between its first and last month")]
    SeriesGap { entity: EntityId, missing: Month },
    #[error("entity {entity} reports month {month} outside the reporting window {first} to {last}")]
    OutsideWindow {
        entity: EntityId,
        month: Month,
        first: Month,
        last: Month,
    },
}

/// Lookup of an entity id that is not in the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entity {0} not found")]
pub struct NotFoundError(pub EntityId);

/// A metric cannot be computed because the series is too short.
///
/// Recoverable: the metric is reported as not available and the other
/// metrics are still computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient data for {metric}: need {required} periods, have {available}")]
pub struct InsufficientDataError {
    pub metric: &'static str,
    pub required: usize,
    pub available: usize,
}

impl InsufficientDataError {
    pub fn new(metric: &'static str, required: usize, available: usize) -> Self {
        Self {
            metric,
            required,
            available,
        }
    }
}

/// Any error raised by the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),
    #[error(transparent)]
    Collaborator(#[from] crate::assistant::llm::CollaboratorError),
    #[error("cannot write {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("cannot serialize output: {0}")]
    Json(#[from] serde_json::Error),
}
