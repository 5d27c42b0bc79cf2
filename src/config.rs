use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::errors::IntakeError;
use crate::model::{PROCESSED_CSV_PREFIX, RunId};
use crate::util::{ensure_directory, utc_compact_string};

/// Directory layout of one working root.
#[derive(Debug, Clone)]
pub struct WorkLayout {
    pub root: PathBuf,
    /// Canonical output tree written by the Manifest Processor.
    pub output_dir: PathBuf,
    /// Mirrored tree of single-page files written by the Page Splitter.
    pub split_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            output_dir: root.join("output"),
            split_dir: root.join("split_output"),
            processed_dir: root.join("processed"),
            reports_dir: root.join("reports"),
            root,
        }
    }

    pub fn default_db_path(&self) -> PathBuf {
        self.root.join("scan_intake.sqlite")
    }

    pub fn report_path(&self, stage: &str, ts: DateTime<Utc>) -> PathBuf {
        self.reports_dir
            .join(format!("{stage}_{}.json", utc_compact_string(ts)))
    }

    /// Path of the processed-rows CSV for `run_id`, or the latest one when no
    /// run is named.
    pub fn processed_csv(&self, run_id: Option<&RunId>) -> Result<PathBuf> {
        match run_id {
            Some(run_id) => {
                let path = self.processed_dir.join(run_id.csv_file_name());
                if !path.is_file() {
                    return Err(IntakeError::NoProcessedCsv(self.processed_dir.clone()))
                        .with_context(|| format!("run {run_id} has no {}", path.display()));
                }
                Ok(path)
            }
            None => latest_processed_csv(&self.processed_dir)?
                .ok_or_else(|| IntakeError::NoProcessedCsv(self.processed_dir.clone()).into()),
        }
    }

    pub fn ensure_processed_dir(&self) -> Result<()> {
        ensure_directory(&self.processed_dir)
    }
}

/// Latest `processed_*.csv` by file-name timestamp. The timestamp format sorts
/// lexicographically, so this is also the most recently written run.
pub fn latest_processed_csv(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut latest: Option<(String, PathBuf)> = None;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let Some(name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
            continue;
        };
        if !name.starts_with(PROCESSED_CSV_PREFIX) || !name.ends_with(".csv") {
            continue;
        }
        if latest.as_ref().is_none_or(|(best, _)| name > *best) {
            latest = Some((name, entry.path()));
        }
    }

    Ok(latest.map(|(_, path)| path))
}
