use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use r2d2::CustomizeConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::errors::IntakeError;

/// A checked-out connection; returned to the pool on drop.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub db_path: PathBuf,
    pub max_connections: usize,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub health_check_interval: Duration,
}

impl StoreSettings {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            max_connections: 20,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(300),
        }
    }
}

/// Applies the store pragmas to every connection the pool opens.
#[derive(Debug)]
struct ConnectionSetup {
    busy_timeout: Duration,
}

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionSetup {
    fn on_acquire(&self, connection: &mut Connection) -> Result<(), rusqlite::Error> {
        connection.busy_timeout(self.busy_timeout)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }
}

/// Process-wide pool of store connections. Owned by the entry point and
/// borrowed by every SQL-issuing stage.
#[derive(Clone)]
pub struct StorePool {
    inner: r2d2::Pool<SqliteConnectionManager>,
    settings: StoreSettings,
}

impl StorePool {
    /// Builds the pool and performs a tolerated warm-up acquire.
    pub fn open(settings: StoreSettings) -> Result<Self> {
        let max_size = u32::try_from(settings.max_connections.max(1)).unwrap_or(u32::MAX);
        let connect_timeout = settings.connect_timeout.max(Duration::from_millis(1));
        let idle_timeout = Some(settings.idle_timeout).filter(|timeout| !timeout.is_zero());

        let manager = SqliteConnectionManager::file(&settings.db_path);
        let inner = r2d2::Pool::builder()
            .max_size(max_size)
            .min_idle(Some(0))
            .connection_timeout(connect_timeout)
            .idle_timeout(idle_timeout)
            .connection_customizer(Box::new(ConnectionSetup {
                busy_timeout: connect_timeout,
            }))
            .build_unchecked(manager);

        let pool = Self { inner, settings };
        match pool.acquire() {
            Ok(_connection) => info!(path = %pool.db_path().display(), "store pool warm-up succeeded"),
            Err(err) => warn!(error = %format!("{err:#}"), "store pool warm-up failed (tolerated)"),
        }

        Ok(pool)
    }

    pub fn db_path(&self) -> &Path {
        &self.settings.db_path
    }

    /// Checks a connection out, waiting up to the connect timeout for a free
    /// slot.
    pub fn acquire(&self) -> Result<PooledConnection> {
        self.inner
            .get()
            .context(IntakeError::PoolTimeout(self.settings.connect_timeout))
    }

    /// Runs `SELECT 1` on one pooled connection.
    pub fn ping(&self) -> Result<()> {
        let connection = self.acquire()?;
        connection
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("health check query failed")?;
        Ok(())
    }

    /// Starts the periodic health check on its own runtime. Failures are
    /// logged and never tear the pool down. The check stops when the handle
    /// is dropped.
    pub fn start_health_check(&self) -> Result<HealthCheck> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("store-health")
            .enable_time()
            .build()
            .context("failed to start store health check runtime")?;

        let pool = self.clone();
        let interval = self.settings.health_check_interval.max(Duration::from_millis(1));
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let checked = pool.clone();
                match tokio::task::spawn_blocking(move || checked.ping()).await {
                    Ok(Ok(())) => debug!("store pool health check passed"),
                    Ok(Err(err)) => {
                        warn!(error = %format!("{err:#}"), "store pool health check failed (tolerated)")
                    }
                    Err(err) => warn!(error = %err, "store pool health check task aborted"),
                }
            }
        });

        Ok(HealthCheck {
            runtime: Some(runtime),
        })
    }
}

pub struct HealthCheck {
    runtime: Option<Runtime>,
}

impl Drop for HealthCheck {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
