use rusqlite::{Connection, params};

use super::*;
use crate::model::{LogStatus, Outcome};
use crate::store::{StorePool, StoreSettings, count_rows, ensure_schema};
use crate::util::parse_cutoff;

fn open_pool(dir: &tempfile::TempDir) -> StorePool {
    let pool = StorePool::open(StoreSettings::new(dir.path().join("store.sqlite"))).expect("pool opens");
    {
        let connection = pool.acquire().expect("acquire");
        ensure_schema(&connection).expect("schema");
    }
    pool
}

fn insert_doc(connection: &Connection, key: &str, created: &str) -> i64 {
    connection
        .execute(
            "INSERT INTO aif_document_details (user_attr1, creation_date, document_path, created_by)
             VALUES (?1, ?2, ?3, 'system')",
            params![key, created, format!("path/{key}/{created}")],
        )
        .expect("insert document");
    connection.last_insert_rowid()
}

fn document_count(pool: &StorePool) -> i64 {
    let connection = pool.acquire().expect("acquire");
    count_rows(&connection, "SELECT COUNT(*) FROM aif_document_details").expect("count")
}

fn options(dry_run: bool, normalize: bool) -> DedupeOptions {
    DedupeOptions {
        cutoff: parse_cutoff(DEFAULT_CUTOFF).expect("default cutoff parses"),
        dry_run,
        normalize,
    }
}

/// Two keys with pre-cutoff history (one duplicated after the cutoff) and
/// one key that only exists after the cutoff.
fn seed_duplicates(pool: &StorePool) -> Vec<i64> {
    let connection = pool.acquire().expect("acquire");
    vec![
        insert_doc(&connection, "A", "2025-08-01 09:00:00.000000"),
        insert_doc(&connection, "A", "2025-09-02 09:00:00.000000"),
        insert_doc(&connection, "A", "2025-09-03 09:00:00.000000"),
        insert_doc(&connection, "B", "2025-08-15 09:00:00.000000"),
        insert_doc(&connection, "C", "2025-09-05 09:00:00.000000"),
        insert_doc(&connection, "C", "2025-09-02 09:00:00.000000"),
        insert_doc(&connection, "C", "2025-09-02 09:00:00.000000"),
    ]
}

#[test]
fn rule1_is_idempotent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = open_pool(&dir);
    seed_duplicates(&pool);

    let first = reconcile_duplicates(&pool, options(false, false));
    assert_eq!(first.result, Outcome::Success);
    assert_eq!(first.deleted_count, Some(4));
    assert_eq!(first.logs[0].message, "Rule 1 (pre-existing keys) deleted 2 rows.");

    let second = reconcile_duplicates(&pool, options(false, false));
    assert_eq!(second.deleted_count, Some(0));
    assert_eq!(document_count(&pool), 3);
}

#[test]
fn rule2_keeps_earliest_row_per_post_cutoff_key() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = open_pool(&dir);
    let ids = seed_duplicates(&pool);

    reconcile_duplicates(&pool, options(false, false));

    let connection = pool.acquire().expect("acquire");
    let survivors: Vec<i64> = connection
        .prepare("SELECT id FROM aif_document_details WHERE user_attr1 = 'C'")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<rusqlite::Result<_>>()
        .expect("rows");
    assert_eq!(survivors, vec![ids[5]]);

    let remaining_a: i64 = connection
        .query_row(
            "SELECT id FROM aif_document_details WHERE user_attr1 = 'A'",
            [],
            |row| row.get(0),
        )
        .expect("pre-cutoff A survives");
    assert_eq!(remaining_a, ids[0]);
}

#[test]
fn dry_run_previews_without_deleting() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = open_pool(&dir);
    let ids = seed_duplicates(&pool);

    let report = reconcile_duplicates(&pool, options(true, false));
    assert_eq!(report.result, Outcome::Success);
    assert!(report.dry_run);
    assert_eq!(report.deleted_count, None);
    assert_eq!(report.cutoff_tms, "2025-08-31 00:00:00.000000");

    let rows = report.rows.expect("preview rows");
    let rule1: Vec<i64> = rows.iter().filter(|row| row.reason == "Rule 1").map(|row| row.id).collect();
    let rule2: Vec<&PreviewRow> = rows.iter().filter(|row| row.reason == "Rule 2").collect();
    assert_eq!(rule1, vec![ids[1], ids[2]]);
    assert!(rows.iter().filter(|row| row.reason == "Rule 1").all(|row| row.rn.is_none()));
    assert_eq!(rule2.len(), 2);
    assert!(rule2.iter().all(|row| row.rn.unwrap_or_default() > 1));
    assert!(rule2.iter().all(|row| row.key.as_deref() == Some("C")));

    assert_eq!(document_count(&pool), 7);
}

#[test]
fn normalize_compares_trimmed_lowercase_keys() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = open_pool(&dir);
    {
        let connection = pool.acquire().expect("acquire");
        insert_doc(&connection, " Abc", "2025-08-01 00:00:00.000000");
        insert_doc(&connection, "abc", "2025-09-10 00:00:00.000000");
    }

    let raw = reconcile_duplicates(&pool, options(false, false));
    assert_eq!(raw.deleted_count, Some(0));

    let normalized = reconcile_duplicates(&pool, options(false, true));
    assert_eq!(normalized.deleted_count, Some(1));
    assert_eq!(document_count(&pool), 1);
}

fn seed_canonical(connection: &Connection) {
    connection
        .execute_batch(
            "
            INSERT INTO client_master (id, client_code) VALUES (495348, '150');
            INSERT INTO aif_folio (id, folio_number, client_id) VALUES (10, 'AC-9', 495348);
            INSERT INTO aif_transaction_summary
              (id, client_id, folio_id, transaction_number, user_attr5, trxn_status, created_by)
            VALUES
              (100, 495348, 10, 'TXN-77', '1001', NULL, 'aifappendersvc'),
              (101, 495348, 10, 'TXN-78', '1002', 'R', 'aifappendersvc'),
              (102, 495348, 10, 'TXN-79', '1003', 'A', 'someone-else');
            INSERT INTO aif_document_details
              (user_attr1, user_attr2, transaction_reference_id, created_by, client_id)
            VALUES
              ('1001', 'AC-9', '1001', 'system', 495348),
              ('5555', 'AC-X', '5555', 'system', 495348);
            ",
        )
        .expect("seed canonical tables");
}

#[test]
fn folio_reconcile_backfills_identifiers() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = open_pool(&dir);
    {
        let connection = pool.acquire().expect("acquire");
        seed_canonical(&connection);
        connection
            .execute("INSERT INTO temp_images_1 VALUES ('999', 'stale', 'stale')", [])
            .expect("stale staging row");
    }

    let report = reconcile_folios(&pool, &["150".to_string()]);
    assert_eq!(report.result, Outcome::Success);
    assert_eq!(report.logs.len(), 4);
    assert_eq!(report.logs[1].message, "Inserted 1 rows into temp_images_1");
    assert_eq!(report.logs[3].status, LogStatus::Updated);

    let connection = pool.acquire().expect("acquire");
    let staged: Vec<(String, String, String)> = connection
        .prepare("SELECT client_code, folio_number, ihno FROM temp_images_1")
        .expect("prepare")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("query")
        .collect::<rusqlite::Result<_>>()
        .expect("rows");
    assert_eq!(
        staged,
        vec![("150".to_string(), "AC-9".to_string(), "1001".to_string())]
    );

    let (folio, reference): (Option<i64>, String) = connection
        .query_row(
            "SELECT folio_id, transaction_reference_id FROM aif_document_details WHERE user_attr1 = '1001'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("document row");
    assert_eq!(folio, Some(10));
    assert_eq!(reference, "TXN-77");

    let untouched: Option<i64> = connection
        .query_row(
            "SELECT folio_id FROM aif_document_details WHERE user_attr1 = '5555'",
            [],
            |row| row.get(0),
        )
        .expect("document row");
    assert_eq!(untouched, None);
}

#[test]
fn folio_reconcile_rolls_back_on_failure() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = open_pool(&dir);
    {
        let connection = pool.acquire().expect("acquire");
        connection
            .execute("INSERT INTO temp_images_1 VALUES ('999', 'stale', 'stale')", [])
            .expect("stale staging row");
        connection
            .execute_batch("DROP TABLE aif_folio;")
            .expect("drop folio table");
    }

    let report = reconcile_folios(&pool, &["150".to_string()]);
    assert_eq!(report.result, Outcome::Failed);
    assert!(
        report
            .logs
            .last()
            .is_some_and(|log| log.message.starts_with("Folio update failed"))
    );

    let connection = pool.acquire().expect("acquire");
    assert_eq!(
        count_rows(&connection, "SELECT COUNT(*) FROM temp_images_1").expect("count"),
        1
    );
}
