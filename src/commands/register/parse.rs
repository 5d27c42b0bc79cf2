use serde::Serialize;
use tracing::warn;

use crate::model::{LogStatus, PageCount, SqlLog};
use crate::processed::ProcessedRecord;

/// A processed-rows CSV line parsed into typed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionTuple {
    pub row: usize,
    pub id_fund: i64,
    pub id_trtype: String,
    pub id_ihno: i64,
    pub image: String,
    pub id_path: String,
    pub id_acno: String,
    pub page_count: PageCount,
}

impl TransactionTuple {
    pub fn parse(record: &ProcessedRecord) -> Result<Self, String> {
        let id_fund = record
            .id_fund
            .parse::<i64>()
            .map_err(|_| format!("invalid id_fund '{}'", record.id_fund))?;
        let id_ihno = record
            .id_ihno
            .parse::<i64>()
            .map_err(|_| format!("invalid id_ihno '{}'", record.id_ihno))?;
        let page_count = PageCount::parse(&record.page_count)?;

        Ok(Self {
            row: record.line,
            id_fund,
            id_trtype: record.id_trtype.clone(),
            id_ihno,
            image: record.image.clone(),
            id_path: record.id_path.clone(),
            id_acno: record.id_acno.clone(),
            page_count,
        })
    }
}

/// Parses every record, logging the ones that cannot be typed.
pub fn parse_transactions(records: &[ProcessedRecord]) -> (Vec<TransactionTuple>, Vec<SqlLog>) {
    let mut transactions = Vec::with_capacity(records.len());
    let mut logs = Vec::new();

    for record in records {
        match TransactionTuple::parse(record) {
            Ok(tuple) => transactions.push(tuple),
            Err(message) => {
                warn!(row = record.line, error = %message, "failed to parse processed row");
                logs.push(SqlLog::new(
                    record.line,
                    LogStatus::Error,
                    format!("Failed to parse row: {message}"),
                ));
            }
        }
    }

    (transactions, logs)
}
