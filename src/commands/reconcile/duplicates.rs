use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use serde::Serialize;
use tracing::{error, info};

use crate::model::{LogStatus, Outcome, SqlLog};
use crate::store::{StorePool, rollback_logged};
use crate::util::db_timestamp;

/// Cutoff used when none is given on the command line.
pub const DEFAULT_CUTOFF: &str = "2025-08-31T00:00:00.0000";

#[derive(Debug, Clone, Copy)]
pub struct DedupeOptions {
    pub cutoff: DateTime<Utc>,
    pub dry_run: bool,
    pub normalize: bool,
}

/// A registered row that a live run would delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewRow {
    pub id: i64,
    pub key: Option<String>,
    pub creation_date: Option<String>,
    pub document_path: Option<String>,
    /// Position within its key group; absent for Rule 1 rows.
    pub rn: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub result: Outcome,
    pub dry_run: bool,
    pub cutoff_tms: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<PreviewRow>>,
    pub logs: Vec<SqlLog>,
}

fn key_expr(normalize: bool) -> &'static str {
    if normalize {
        "TRIM(LOWER(user_attr1))"
    } else {
        "user_attr1"
    }
}

fn rule1_sql(key: &str) -> String {
    format!(
        "
WITH pre_cutoff_keys AS (
  SELECT DISTINCT {key} AS k
  FROM aif_document_details
  WHERE user_attr1 IS NOT NULL
    AND creation_date <= ?1
)
DELETE FROM aif_document_details
WHERE {key} IN (SELECT k FROM pre_cutoff_keys)
  AND creation_date > ?1
"
    )
}

fn rule2_sql(key: &str) -> String {
    format!(
        "
WITH post_cutoff_only_keys AS (
  SELECT {key} AS k
  FROM aif_document_details
  WHERE user_attr1 IS NOT NULL
  GROUP BY {key}
  HAVING MIN(creation_date) > ?1
),
dups_to_delete AS (
  SELECT
    d.id,
    ROW_NUMBER() OVER (
      PARTITION BY {key}
      ORDER BY d.creation_date ASC, d.id ASC
    ) AS rn
  FROM aif_document_details d
  JOIN post_cutoff_only_keys p ON {key} = p.k
)
DELETE FROM aif_document_details
WHERE id IN (SELECT id FROM dups_to_delete WHERE rn > 1)
"
    )
}

fn preview_sql(key: &str) -> String {
    format!(
        "
WITH post_cutoff_only_keys AS (
  SELECT {key} AS k
  FROM aif_document_details
  WHERE user_attr1 IS NOT NULL
  GROUP BY {key}
  HAVING MIN(creation_date) > ?1
),
post_cutoff_dups_ranked AS (
  SELECT
    d.id,
    {key} AS k,
    d.creation_date,
    d.document_path,
    ROW_NUMBER() OVER (PARTITION BY {key} ORDER BY d.creation_date ASC, d.id ASC) AS rn
  FROM aif_document_details d
  WHERE {key} IN (SELECT k FROM post_cutoff_only_keys)
)
SELECT d.id, {key} AS k, d.creation_date, d.document_path, NULL AS rn, 'Rule 1' AS reason
FROM aif_document_details d
WHERE {key} IN (
  SELECT DISTINCT {key}
  FROM aif_document_details
  WHERE user_attr1 IS NOT NULL AND creation_date <= ?1
)
  AND d.creation_date > ?1

UNION ALL

SELECT r2.id, r2.k, r2.creation_date, r2.document_path, r2.rn, 'Rule 2' AS reason
FROM post_cutoff_dups_ranked r2
WHERE r2.rn > 1
ORDER BY 6, 1
"
    )
}

/// Applies (or, in dry-run mode, previews) both duplicate rules in one
/// transaction. A dry run always rolls back.
pub fn reconcile_duplicates(pool: &StorePool, options: DedupeOptions) -> DuplicateReport {
    let cutoff_tms = db_timestamp(options.cutoff);
    info!(
        cutoff = %cutoff_tms,
        dry_run = options.dry_run,
        normalize = options.normalize,
        "duplicate sanity check started"
    );

    let mut report = DuplicateReport {
        result: Outcome::Success,
        dry_run: options.dry_run,
        cutoff_tms,
        deleted_count: None,
        rows: None,
        logs: Vec::new(),
    };

    let outcome = pool.acquire().and_then(|mut connection| {
        if options.dry_run {
            preview(&mut connection, &report.cutoff_tms, options.normalize)
                .map(|rows| report.rows = Some(rows))
        } else {
            delete_duplicates(
                &mut connection,
                &report.cutoff_tms,
                options.normalize,
                &mut report.logs,
            )
            .map(|deleted| report.deleted_count = Some(deleted))
        }
    });

    if let Err(err) = outcome {
        error!(error = %format!("{err:#}"), "duplicate sanity check failed");
        report.result = Outcome::Failed;
        report.logs.push(SqlLog::new(
            0,
            LogStatus::Error,
            format!("Sanity check failed: {err:#}"),
        ));
    }

    report
}

fn preview(connection: &mut Connection, cutoff: &str, normalize: bool) -> Result<Vec<PreviewRow>> {
    let tx = connection
        .transaction()
        .context("failed to begin preview transaction")?;
    let rows = preview_rows(&tx, cutoff, normalize);
    rollback_logged(tx, "dedupe-preview");

    let rows = rows?;
    info!(rows = rows.len(), "dry run complete, rows would be deleted");
    Ok(rows)
}

fn preview_rows(tx: &Transaction<'_>, cutoff: &str, normalize: bool) -> Result<Vec<PreviewRow>> {
    let sql = preview_sql(key_expr(normalize));
    let mut statement = tx
        .prepare(&sql)
        .context("failed to prepare duplicate preview")?;
    let rows = statement
        .query_map(params![cutoff], |row| {
            Ok(PreviewRow {
                id: row.get(0)?,
                key: row.get(1)?,
                creation_date: row.get(2)?,
                document_path: row.get(3)?,
                rn: row.get(4)?,
                reason: row.get(5)?,
            })
        })
        .context("failed to run duplicate preview")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to read duplicate preview row")?;
    Ok(rows)
}

fn delete_duplicates(
    connection: &mut Connection,
    cutoff: &str,
    normalize: bool,
    logs: &mut Vec<SqlLog>,
) -> Result<usize> {
    let key = key_expr(normalize);
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin delete transaction")?;

    let deleted = tx
        .execute(&rule1_sql(key), params![cutoff])
        .context("Rule 1 delete failed")
        .and_then(|rule1| {
            logs.push(SqlLog::new(
                0,
                LogStatus::Updated,
                format!("Rule 1 (pre-existing keys) deleted {rule1} rows."),
            ));
            let rule2 = tx
                .execute(&rule2_sql(key), params![cutoff])
                .context("Rule 2 delete failed")?;
            logs.push(SqlLog::new(
                0,
                LogStatus::Updated,
                format!("Rule 2 (post-cutoff duplicates) deleted {rule2} rows."),
            ));
            info!(rule1, rule2, "duplicate rules applied");
            Ok(rule1 + rule2)
        });

    match deleted {
        Ok(deleted) => {
            tx.commit().context("COMMIT failed")?;
            info!(deleted, "duplicate sanity check committed");
            Ok(deleted)
        }
        Err(err) => {
            rollback_logged(tx, "dedupe");
            Err(err)
        }
    }
}
