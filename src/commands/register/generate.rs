use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::parse::{TransactionTuple, parse_transactions};
use super::record::{RecordSkip, RegistrationRecord, insert_statement};
use crate::config::WorkLayout;
use crate::model::{LogStatus, RunId, SqlLog};
use crate::processed::read_processed_csv;
use crate::util::db_timestamp;

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateResult {
    pub run_id: Option<RunId>,
    pub sql: String,
    pub transactions: Vec<TransactionTuple>,
    pub logs: Vec<SqlLog>,
}

impl GenerateResult {
    fn empty(run_id: Option<RunId>, mut logs: Vec<SqlLog>, message: String) -> Self {
        logs.push(SqlLog::new(0, LogStatus::Error, message));
        Self {
            run_id,
            logs,
            ..Self::default()
        }
    }
}

/// Renders one multi-row INSERT for the run's processed rows. Never fails:
/// a missing or unreadable CSV yields an empty statement and an error log.
pub fn generate(layout: &WorkLayout, run_id: Option<&RunId>) -> GenerateResult {
    let csv_path = match layout.processed_csv(run_id) {
        Ok(path) => path,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "no processed csv for sql generation");
            return GenerateResult::empty(
                run_id.cloned(),
                Vec::new(),
                "No processed CSV found".to_string(),
            );
        }
    };

    let run_id = csv_run_id(&csv_path);
    match generate_from(&csv_path, run_id.clone()) {
        Ok(result) => result,
        Err(err) => {
            warn!(path = %csv_path.display(), error = %format!("{err:#}"), "sql generation failed");
            GenerateResult::empty(run_id, Vec::new(), format!("generateSql failed: {err:#}"))
        }
    }
}

fn generate_from(csv_path: &Path, run_id: Option<RunId>) -> Result<GenerateResult> {
    info!(path = %csv_path.display(), "reading processed csv");
    let records = read_processed_csv(csv_path)?;
    let (transactions, mut logs) = parse_transactions(&records);
    info!(rows = transactions.len(), "parsed transaction rows");

    let timestamp = db_timestamp(Utc::now());
    let mut values = Vec::new();
    for tuple in &transactions {
        match RegistrationRecord::from_transaction(tuple, &timestamp) {
            Ok(record) => {
                let sql = record.sql_values();
                logs.push(
                    SqlLog::new(tuple.row, LogStatus::Success, "SQL generated for row")
                        .with_sql(sql.clone()),
                );
                values.push(sql);
            }
            Err(skip) => logs.push(skip_log(tuple.row, &skip)),
        }
    }

    if values.is_empty() {
        warn!("no valid rows to generate sql");
        return Ok(GenerateResult::empty(
            run_id,
            logs,
            "No valid rows to generate SQL".to_string(),
        ));
    }

    info!(rows = values.len(), "generated multi-row sql");
    Ok(GenerateResult {
        run_id,
        sql: insert_statement(&values),
        transactions,
        logs,
    })
}

pub(super) fn skip_log(row: usize, skip: &RecordSkip) -> SqlLog {
    match skip {
        RecordSkip::NoPageCount(tag) => {
            info!(row, tag = %tag, "row has no page count, skipping");
            SqlLog::new(row, LogStatus::Skipped, format!("Row not registered: {tag}"))
        }
        RecordSkip::InvalidExtension => {
            warn!(row, "invalid file extension");
            SqlLog::new(row, LogStatus::Error, "Invalid file extension")
        }
    }
}

fn csv_run_id(path: &Path) -> Option<RunId> {
    path.file_name()
        .and_then(|name| RunId::from_csv_name(&name.to_string_lossy()))
}

/// Distinct fund codes of a processed-rows CSV, in ascending order. Rows
/// whose fund does not parse are left out.
pub fn fund_codes(csv_path: &Path) -> Result<Vec<String>> {
    let records = read_processed_csv(csv_path)?;
    let (transactions, _) = parse_transactions(&records);
    let mut funds: Vec<i64> = transactions.iter().map(|tuple| tuple.id_fund).collect();
    funds.sort_unstable();
    funds.dedup();
    Ok(funds.into_iter().map(|fund| fund.to_string()).collect())
}
