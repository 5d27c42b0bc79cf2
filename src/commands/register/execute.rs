use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info};

use super::generate::{generate, skip_log};
use super::parse::TransactionTuple;
use super::record::{RegistrationRecord, parameterized_insert};
use crate::config::WorkLayout;
use crate::model::{LogStatus, RunId, SqlLog, StageReport};
use crate::store::{StorePool, rollback_logged};
use crate::util::db_timestamp;

/// Inserts every registrable row of the run inside one transaction. Any
/// statement failure rolls the whole batch back and yields a failed report.
pub fn execute(pool: &StorePool, layout: &WorkLayout, run_id: Option<&RunId>) -> StageReport {
    info!("generating sql from processed csv");
    let generated = generate(layout, run_id);
    let mut logs = generated.logs;

    if generated.transactions.is_empty() {
        error!("no transactions to execute");
        logs.push(SqlLog::new(0, LogStatus::Error, "No transactions to execute"));
        return StageReport::failed(logs);
    }

    match insert_transactions(pool, &generated.transactions, &mut logs) {
        Ok(inserted) => {
            info!(inserted, "sql executed successfully");
            StageReport::success(logs)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "sql execution failed");
            logs.push(SqlLog::new(
                0,
                LogStatus::Error,
                format!("executeSql failed: {err:#}"),
            ));
            StageReport::failed(logs)
        }
    }
}

fn insert_transactions(
    pool: &StorePool,
    transactions: &[TransactionTuple],
    logs: &mut Vec<SqlLog>,
) -> Result<usize> {
    let mut connection = pool.acquire()?;
    let tx = connection
        .transaction()
        .context("failed to begin transaction")?;
    info!("BEGIN started");

    let sql = parameterized_insert();
    let timestamp = db_timestamp(Utc::now());
    let mut inserted = 0;
    for tuple in transactions {
        let record = match RegistrationRecord::from_transaction(tuple, &timestamp) {
            Ok(record) => record,
            Err(skip) => {
                logs.push(skip_log(tuple.row, &skip));
                continue;
            }
        };

        if let Err(err) = tx.execute(&sql, &record.params()) {
            rollback_logged(tx, "execute-sql");
            return Err(err).with_context(|| format!("failed to insert row {}", tuple.row));
        }
        info!(row = tuple.row, "inserted row");
        logs.push(SqlLog::new(
            tuple.row,
            LogStatus::Executed,
            format!("Row {} inserted successfully", tuple.row),
        ));
        inserted += 1;
    }

    tx.commit().context("COMMIT failed")?;
    info!(inserted, "COMMIT successful");
    Ok(inserted)
}
