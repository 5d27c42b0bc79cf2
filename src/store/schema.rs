use anyhow::{Context, Result};
use rusqlite::Connection;

pub const DOCUMENT_TABLE: &str = "aif_document_details";
pub const STAGING_TABLE: &str = "temp_images_1";

/// Creates the registered-document table, the folio staging table and local
/// stand-ins for the upstream canonical tables when they are missing.
pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS aif_document_details (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              document_process TEXT,
              document_activity TEXT,
              document_type TEXT,
              document_format TEXT,
              document_path TEXT,
              folio_id INTEGER,
              transaction_reference_id TEXT,
              document_status TEXT,
              mime_type TEXT,
              user_attr0 TEXT,
              user_attr1 TEXT,
              user_attr2 TEXT,
              user_attr3 TEXT,
              user_attr4 TEXT,
              user_attr5 TEXT,
              user_attr6 TEXT,
              user_attr7 TEXT,
              user_attr8 TEXT,
              user_attr9 TEXT,
              approval_status TEXT,
              approved_by TEXT,
              approved_on TEXT,
              comments TEXT,
              audit_code TEXT,
              del_flag INTEGER NOT NULL DEFAULT 0,
              last_update_tms TEXT,
              last_updated_by TEXT,
              creation_date TEXT,
              created_by TEXT,
              page_count INTEGER,
              client_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS temp_images_1 (
              client_code TEXT,
              folio_number TEXT,
              ihno TEXT
            );

            CREATE TABLE IF NOT EXISTS client_master (
              id INTEGER PRIMARY KEY,
              client_code TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS aif_folio (
              id INTEGER PRIMARY KEY,
              folio_number TEXT NOT NULL,
              client_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS aif_transaction_summary (
              id INTEGER PRIMARY KEY,
              client_id INTEGER NOT NULL,
              folio_id INTEGER,
              transaction_number TEXT,
              user_attr5 TEXT,
              trxn_status TEXT,
              created_by TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_document_details_user_attr1
              ON aif_document_details(user_attr1);
            CREATE INDEX IF NOT EXISTS idx_document_details_creation_date
              ON aif_document_details(creation_date);
            ",
        )
        .context("failed to initialize store schema")?;

    Ok(())
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
