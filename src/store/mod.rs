mod pool;
mod schema;

pub use pool::{HealthCheck, PooledConnection, StorePool, StoreSettings};
pub use schema::{DOCUMENT_TABLE, STAGING_TABLE, count_rows, ensure_schema};

/// Rolls back `tx`, logging instead of propagating a rollback failure.
pub fn rollback_logged(tx: rusqlite::Transaction<'_>, stage: &str) {
    match tx.rollback() {
        Ok(()) => tracing::info!(stage, "transaction rolled back"),
        Err(err) => tracing::error!(stage, error = %err, "ROLLBACK failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::errors::IntakeError;

    fn settings(dir: &tempfile::TempDir) -> StoreSettings {
        let mut settings = StoreSettings::new(dir.path().join("store.sqlite"));
        settings.max_connections = 2;
        settings.connect_timeout = Duration::from_millis(50);
        settings
    }

    #[test]
    fn pool_reuses_released_connections() {
        let dir = tempfile::tempdir().expect("temp dir");
        let pool = StorePool::open(settings(&dir)).expect("pool opens");

        {
            let connection = pool.acquire().expect("first acquire");
            ensure_schema(&connection).expect("schema");
        }

        let connection = pool.acquire().expect("second acquire");
        let count = count_rows(&connection, "SELECT COUNT(*) FROM aif_document_details")
            .expect("count");
        assert_eq!(count, 0);
        pool.ping().expect("ping with one free slot");
    }

    #[test]
    fn pooled_connections_use_wal_journal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let pool = StorePool::open(settings(&dir)).expect("pool opens");

        let connection = pool.acquire().expect("acquire");
        let mode: String = connection
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("journal mode");
        assert_eq!(mode.to_ascii_lowercase(), "wal");
        let synchronous: i64 = connection
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .expect("synchronous");
        assert_eq!(synchronous, 1);
    }

    #[test]
    fn pool_times_out_when_exhausted() {
        let dir = tempfile::tempdir().expect("temp dir");
        let pool = StorePool::open(settings(&dir)).expect("pool opens");

        let _first = pool.acquire().expect("first");
        let _second = pool.acquire().expect("second");
        let err = pool.acquire().err().expect("third acquire must time out");
        assert!(matches!(
            err.downcast_ref::<IntakeError>(),
            Some(IntakeError::PoolTimeout(_))
        ));
    }

    #[test]
    fn released_connection_frees_its_slot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let pool = StorePool::open(settings(&dir)).expect("pool opens");

        let first = pool.acquire().expect("first");
        let _second = pool.acquire().expect("second");
        drop(first);
        pool.acquire().expect("slot freed on release");
    }

    #[test]
    fn warm_up_failure_is_tolerated() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut settings = settings(&dir);
        settings.db_path = dir.path().join("missing").join("store.sqlite");

        let pool = StorePool::open(settings).expect("pool opens despite warm-up failure");
        assert!(pool.acquire().is_err());
    }

    #[test]
    fn health_check_stops_on_drop() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut settings = settings(&dir);
        settings.health_check_interval = Duration::from_millis(10);
        let pool = StorePool::open(settings).expect("pool opens");

        let handle = pool.start_health_check().expect("health check starts");
        std::thread::sleep(Duration::from_millis(40));
        drop(handle);
        pool.ping().expect("pool still usable after health checks");
    }
}
