//! Reading and writing the `;`-separated company and transaction files.
//!
//! Raw rows are deserialized as strings and validated here, so nothing
//! untyped reaches the store or the metrics engine.

use crate::core::entity::{EntityId, Month, SectorCode};
use crate::core::error::DataIntegrityError;
use crate::core::records::{CompanyRecord, TransactionRecord};
use crate::core::store::EntityStore;
use crate::core::transaction::TransactionKind;
use chrono::NaiveDate;
use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

pub const DELIMITER: u8 = b';';

pub const COMPANY_COLUMNS: [&str; 5] = ["ID", "DT_REFE", "VL_FATU", "VL_SLDO", "DS_CNAE"];
pub const TRANSACTION_COLUMNS: [&str; 5] = ["ID_PGTO", "ID_RCBE", "VL", "DS_TRAN", "DT_REFE"];

const COMPANY: &str = "company";
const TRANSACTION: &str = "transaction";

#[derive(Debug, Deserialize, Serialize)]
struct CompanyRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "DT_REFE")]
    reference_date: String,
    #[serde(rename = "VL_FATU")]
    revenue: String,
    #[serde(rename = "VL_SLDO")]
    balance: String,
    #[serde(rename = "DS_CNAE")]
    sector: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct TransactionRow {
    #[serde(rename = "ID_PGTO")]
    payer: String,
    #[serde(rename = "ID_RCBE")]
    payee: String,
    #[serde(rename = "VL")]
    amount: String,
    #[serde(rename = "DS_TRAN")]
    kind: String,
    #[serde(rename = "DT_REFE")]
    date: String,
}

/// Read and validate the company dataset.
pub fn read_companies<R: Read>(reader: R) -> Result<Vec<CompanyRecord>, DataIntegrityError> {
    let mut rdr = reader_for(reader);
    check_columns(&mut rdr, COMPANY, &COMPANY_COLUMNS)?;

    let mut records = Vec::new();
    for (i, result) in rdr.deserialize::<CompanyRow>().enumerate() {
        let row = i + 1;
        let raw = result.map_err(|source| DataIntegrityError::Csv {
            dataset: COMPANY,
            source,
        })?;
        let month = Month::parse(&raw.reference_date).ok_or_else(|| {
            invalid(COMPANY, row, "DT_REFE", &raw.reference_date)
        })?;
        records.push(CompanyRecord {
            id: EntityId::new(raw.id.trim()),
            month,
            revenue: parse_decimal(&raw.revenue)
                .ok_or_else(|| invalid(COMPANY, row, "VL_FATU", &raw.revenue))?,
            balance: parse_decimal(&raw.balance)
                .ok_or_else(|| invalid(COMPANY, row, "VL_SLDO", &raw.balance))?,
            sector: SectorCode::new(raw.sector.trim()),
        });
    }
    Ok(records)
}

/// Read and validate the transaction dataset.
pub fn read_transactions<R: Read>(
    reader: R,
) -> Result<Vec<TransactionRecord>, DataIntegrityError> {
    let mut rdr = reader_for(reader);
    check_columns(&mut rdr, TRANSACTION, &TRANSACTION_COLUMNS)?;

    let mut records = Vec::new();
    for (i, result) in rdr.deserialize::<TransactionRow>().enumerate() {
        let row = i + 1;
        let raw = result.map_err(|source| DataIntegrityError::Csv {
            dataset: TRANSACTION,
            source,
        })?;
        records.push(TransactionRecord {
            payer: EntityId::new(raw.payer.trim()),
            payee: EntityId::new(raw.payee.trim()),
            amount: parse_decimal(&raw.amount)
                .ok_or_else(|| invalid(TRANSACTION, row, "VL", &raw.amount))?,
            date: parse_date(&raw.date).ok_or_else(|| invalid(TRANSACTION, row, "DT_REFE", &raw.date))?,
            kind: TransactionKind::from_str(&raw.kind)
                .map_err(|_| invalid(TRANSACTION, row, "DS_TRAN", &raw.kind))?,
        });
    }
    Ok(records)
}

pub fn read_companies_file(path: &Path) -> Result<Vec<CompanyRecord>, DataIntegrityError> {
    read_companies(open(path)?)
}

pub fn read_transactions_file(path: &Path) -> Result<Vec<TransactionRecord>, DataIntegrityError> {
    read_transactions(open(path)?)
}

/// Read both files and build the store.
pub fn load_store(
    companies: &Path,
    transactions: &Path,
) -> Result<EntityStore, DataIntegrityError> {
    let company_rows = read_companies_file(companies)?;
    let transaction_rows = read_transactions_file(transactions)?;
    info!(
        "read {} company rows from {} and {} transaction rows from {}",
        company_rows.len(),
        companies.display(),
        transaction_rows.len(),
        transactions.display()
    );
    EntityStore::load(company_rows, transaction_rows)
}

/// Write company records in the same layout [`read_companies`] accepts.
pub fn write_companies<W: Write>(writer: W, records: &[CompanyRecord]) -> csv::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_writer(writer);
    for r in records {
        wtr.serialize(CompanyRow {
            id: r.id.to_string(),
            reference_date: r
                .month
                .first_day()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| r.month.to_string()),
            revenue: r.revenue.to_string(),
            balance: r.balance.to_string(),
            sector: r.sector.to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write transaction records in the same layout [`read_transactions`] accepts.
pub fn write_transactions<W: Write>(writer: W, records: &[TransactionRecord]) -> csv::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_writer(writer);
    for r in records {
        wtr.serialize(TransactionRow {
            payer: r.payer.to_string(),
            payee: r.payee.to_string(),
            amount: r.amount.to_string(),
            kind: r.kind.to_string(),
            date: r.date.format("%Y-%m-%d").to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn reader_for<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .trim(csv::Trim::Headers)
        .from_reader(reader)
}

fn check_columns<R: Read>(
    rdr: &mut csv::Reader<R>,
    dataset: &'static str,
    required: &[&'static str],
) -> Result<(), DataIntegrityError> {
    let headers = rdr
        .headers()
        .map_err(|source| DataIntegrityError::Csv { dataset, source })?;
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(DataIntegrityError::MissingColumn { dataset, column });
        }
    }
    Ok(())
}

fn open(path: &Path) -> Result<File, DataIntegrityError> {
    File::open(path).map_err(|source| DataIntegrityError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn invalid(dataset: &'static str, row: usize, column: &'static str, value: &str) -> DataIntegrityError {
    DataIntegrityError::InvalidValue {
        dataset,
        row,
        column,
        value: value.to_string(),
    }
}

/// Plain or scientific notation; a lone comma is read as the decimal separator.
fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let normalized = if s.contains(',') && !s.contains('.') {
        s.replace(',', ".")
    } else {
        s.to_string()
    };
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// `YYYY-MM-DD`, optionally followed by a time, or `DD/MM/YYYY`.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%d/%m/%Y"))
        .ok()
}
