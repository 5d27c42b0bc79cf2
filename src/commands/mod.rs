pub mod process;
pub mod reconcile;
pub mod register;
pub mod split;
pub mod status;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::cli::StoreArgs;
use crate::config::WorkLayout;
use crate::store::{HealthCheck, StorePool, ensure_schema};
use crate::util::write_json_pretty;

/// Prints a stage result as JSON on stdout and keeps a copy under the
/// workspace's reports directory.
pub fn emit_report<T: Serialize>(layout: &WorkLayout, stage: &str, value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {stage} report"))?;
    println!("{rendered}");

    let path = layout.report_path(stage, Utc::now());
    write_json_pretty(&path, value)?;
    info!(stage, path = %path.display(), "wrote report");
    Ok(())
}

/// An open store pool plus its running health check. Dropping the handle
/// stops the check.
pub struct StoreHandle {
    pub pool: StorePool,
    _health: HealthCheck,
}

pub fn open_store(layout: &WorkLayout, args: &StoreArgs) -> Result<StoreHandle> {
    let settings = args.settings(layout);
    info!(
        path = %settings.db_path.display(),
        max_connections = settings.max_connections,
        "opening store"
    );

    let pool = StorePool::open(settings)?;
    {
        let connection = pool.acquire()?;
        ensure_schema(&connection)?;
    }
    let health = pool.start_health_check()?;

    Ok(StoreHandle {
        pool,
        _health: health,
    })
}
