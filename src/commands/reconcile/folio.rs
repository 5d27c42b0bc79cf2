use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use tracing::{error, info};

use crate::model::{LogStatus, SqlLog, StageReport};
use crate::store::{StorePool, rollback_logged};

/// Service account that writes the canonical transaction rows.
pub const UPSTREAM_ACCOUNT: &str = "aifappendersvc";

const CLEAR_STAGING_SQL: &str = "DELETE FROM temp_images_1";

const FILL_STAGING_SQL: &str = "
INSERT INTO temp_images_1 (client_code, folio_number, ihno)
SELECT DISTINCT
  cm.client_code,
  fo.folio_number,
  ts.user_attr5
FROM aif_transaction_summary ts
JOIN aif_folio fo ON ts.client_id = fo.client_id AND ts.folio_id = fo.id
JOIN client_master cm ON cm.id = fo.client_id
WHERE cm.client_code = ?1
  AND ts.created_by = ?2
  AND (ts.trxn_status != 'R' OR ts.trxn_status IS NULL)
";

const BACKFILL_FOLIO_SQL: &str = "
UPDATE aif_document_details AS d
SET folio_id = f.id
FROM aif_folio AS f
JOIN client_master cm ON f.client_id = cm.id
LEFT JOIN temp_images_1 AS t
  ON f.folio_number = t.folio_number AND t.client_code = cm.client_code
WHERE d.user_attr2 = f.folio_number
   OR d.transaction_reference_id = t.ihno
";

const BACKFILL_TRANSACTION_SQL: &str = "
UPDATE aif_document_details AS d
SET transaction_reference_id = ts.transaction_number
FROM aif_transaction_summary AS ts
WHERE ts.client_id = d.client_id
  AND ts.folio_id = d.folio_id
  AND ts.user_attr5 = d.user_attr1
  AND d.created_by = 'system'
  AND ts.client_id IN (
    SELECT id FROM client_master
    WHERE client_code IN (SELECT value FROM json_each(?1))
  )
  AND (ts.trxn_status != 'R' OR ts.trxn_status IS NULL)
  AND ts.created_by = ?2
";

/// Clears and repopulates the staging table for `fund_codes`, then backfills
/// folio and transaction-reference identifiers on registered documents. The
/// whole sequence holds the store's write lock.
pub fn reconcile_folios(pool: &StorePool, fund_codes: &[String]) -> StageReport {
    info!(funds = fund_codes.len(), "starting folio and transaction reconcile");
    let mut logs = Vec::new();

    let mut connection = match pool.acquire() {
        Ok(connection) => connection,
        Err(err) => {
            error!(error = %format!("{err:#}"), "folio reconcile could not acquire a connection");
            logs.push(SqlLog::new(
                0,
                LogStatus::Error,
                format!("Folio update failed: {err:#}"),
            ));
            return StageReport::failed(logs);
        }
    };

    match run_steps(&mut connection, fund_codes, &mut logs) {
        Ok(()) => {
            info!("folio and transaction updates completed");
            StageReport::success(logs)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "folio reconcile failed");
            logs.push(SqlLog::new(
                0,
                LogStatus::Error,
                format!("Folio update failed: {err:#}"),
            ));
            StageReport::failed(logs)
        }
    }
}

fn run_steps(connection: &mut Connection, fund_codes: &[String], logs: &mut Vec<SqlLog>) -> Result<()> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin immediate transaction")?;

    match apply_steps(&tx, fund_codes, logs) {
        Ok(()) => {
            tx.commit().context("COMMIT failed")?;
            info!("COMMIT successful");
            Ok(())
        }
        Err(err) => {
            rollback_logged(tx, "reconcile-folios");
            Err(err)
        }
    }
}

fn apply_steps(tx: &Transaction<'_>, fund_codes: &[String], logs: &mut Vec<SqlLog>) -> Result<()> {
    let cleared = tx
        .execute(CLEAR_STAGING_SQL, [])
        .context("failed to clear temp_images_1")?;
    info!(rows = cleared, "cleared temp_images_1");
    logs.push(
        SqlLog::new(0, LogStatus::Executed, "Deleted from temp_images_1")
            .with_sql(CLEAR_STAGING_SQL),
    );

    for fund in fund_codes {
        let inserted = tx
            .execute(FILL_STAGING_SQL, params![fund, UPSTREAM_ACCOUNT])
            .with_context(|| format!("failed to stage folios for client code {fund}"))?;
        info!(client_code = %fund, rows = inserted, "staged folio rows");
        logs.push(
            SqlLog::new(
                0,
                LogStatus::Executed,
                format!("Inserted {inserted} rows into temp_images_1"),
            )
            .with_sql(FILL_STAGING_SQL),
        );
    }

    let folios = tx
        .execute(BACKFILL_FOLIO_SQL, [])
        .context("failed to backfill folio_id")?;
    info!(rows = folios, "updated folio_id");
    logs.push(
        SqlLog::new(
            0,
            LogStatus::Updated,
            format!("Updated {folios} folio_id rows in aif_document_details"),
        )
        .with_sql(BACKFILL_FOLIO_SQL),
    );

    let fund_list = serde_json::to_string(fund_codes).context("failed to encode fund codes")?;
    let references = tx
        .execute(BACKFILL_TRANSACTION_SQL, params![fund_list, UPSTREAM_ACCOUNT])
        .context("failed to backfill transaction_reference_id")?;
    info!(rows = references, "updated transaction_reference_id");
    logs.push(
        SqlLog::new(
            0,
            LogStatus::Updated,
            format!("Updated {references} transaction_reference_id rows in aif_document_details"),
        )
        .with_sql(BACKFILL_TRANSACTION_SQL),
    );

    Ok(())
}
