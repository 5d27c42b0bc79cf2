use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::emit_report;
use crate::config::WorkLayout;
use crate::model::{PageCount, RunId};
use crate::processed::read_processed_csv;
use crate::store::{DOCUMENT_TABLE, STAGING_TABLE, count_rows};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub run_id: Option<RunId>,
    pub csv_path: PathBuf,
    pub rows: usize,
    pub counted_rows: usize,
    pub counted_pages: u64,
    pub failure_tags: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub db_path: PathBuf,
    pub registered_documents: i64,
    pub staging_rows: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub run: Option<RunStatus>,
    pub canonical_files: usize,
    pub split_files: usize,
    pub store: Option<StoreStatus>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let layout = WorkLayout::new(&args.workspace.work_root);
    let run_id = args.run_id.map(RunId::new);
    let db_path = args.db_path.unwrap_or_else(|| layout.default_db_path());

    info!(work_root = %layout.root.display(), "status requested");
    let report = collect(&layout, run_id.as_ref(), &db_path)?;
    emit_report(&layout, "status", &report)
}

pub fn collect(layout: &WorkLayout, run_id: Option<&RunId>, db_path: &Path) -> Result<StatusReport> {
    let run = match layout.processed_csv(run_id) {
        Ok(path) => Some(run_status(&path)?),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "processed csv missing");
            None
        }
    };

    let canonical_files = count_files(&layout.output_dir)?;
    let split_files = count_files(&layout.split_dir)?;
    info!(canonical_files, split_files, "file tree status");

    let store = if db_path.exists() {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let registered_documents =
            count_rows(&conn, &format!("SELECT COUNT(*) FROM {DOCUMENT_TABLE}")).unwrap_or(0);
        let staging_rows =
            count_rows(&conn, &format!("SELECT COUNT(*) FROM {STAGING_TABLE}")).unwrap_or(0);
        info!(
            path = %db_path.display(),
            registered_documents,
            staging_rows,
            "database status"
        );
        Some(StoreStatus {
            db_path: db_path.to_path_buf(),
            registered_documents,
            staging_rows,
        })
    } else {
        warn!(path = %db_path.display(), "database file missing");
        None
    };

    Ok(StatusReport {
        run,
        canonical_files,
        split_files,
        store,
    })
}

fn run_status(csv_path: &Path) -> Result<RunStatus> {
    let records = read_processed_csv(csv_path)?;
    let mut status = RunStatus {
        run_id: csv_path
            .file_name()
            .and_then(|name| RunId::from_csv_name(&name.to_string_lossy())),
        csv_path: csv_path.to_path_buf(),
        rows: records.len(),
        ..RunStatus::default()
    };

    for record in &records {
        match PageCount::parse(&record.page_count) {
            Ok(PageCount::Pages(pages)) => {
                status.counted_rows += 1;
                status.counted_pages += u64::from(pages);
            }
            Ok(PageCount::Failed(reason)) => {
                *status.failure_tags.entry(reason.to_string()).or_default() += 1;
            }
            Err(_) => {
                *status
                    .failure_tags
                    .entry(record.page_count.clone())
                    .or_default() += 1;
            }
        }
    }

    info!(
        run_id = %status.run_id.as_ref().map(RunId::as_str).unwrap_or_default(),
        rows = status.rows,
        counted_rows = status.counted_rows,
        counted_pages = status.counted_pages,
        "loaded processed csv"
    );
    Ok(status)
}

fn count_files(root: &Path) -> Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut count = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))? {
            let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                count += 1;
            }
        }
    }
    Ok(count)
}
