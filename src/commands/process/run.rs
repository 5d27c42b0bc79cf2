use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::pipeline::{CopiedFile, ProcessingSummary, process_worksheet};
use super::sheet::{Worksheet, load_workbook, single_worksheet};
use crate::cli::ProcessArgs;
use crate::commands::emit_report;
use crate::config::WorkLayout;
use crate::model::{PROCESSED_CSV_HEADERS, ProcessedRow, RunId};
use crate::util::file_safe_timestamp;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub output_file_name: String,
    pub run_id: RunId,
    pub summary: ProcessingSummary,
    pub files: Vec<CopiedFile>,
}

pub fn run(args: ProcessArgs) -> Result<()> {
    let layout = WorkLayout::new(&args.workspace.work_root);
    let result = process(&layout, &args.manifest, !args.keep_manifest)?;
    emit_report(&layout, "process", &result)
}

/// Loads the manifest workbook, processes its single worksheet and writes the
/// processed-rows CSV. The workbook is deleted afterwards when
/// `delete_manifest` is set.
pub fn process(
    layout: &WorkLayout,
    manifest_path: &Path,
    delete_manifest: bool,
) -> Result<ProcessingResult> {
    info!(path = %manifest_path.display(), "reading manifest workbook");
    let sheets = load_workbook(manifest_path)?;
    let result = process_sheets(layout, sheets)?;

    if delete_manifest {
        fs::remove_file(manifest_path)
            .with_context(|| format!("failed to delete {}", manifest_path.display()))?;
        info!(path = %manifest_path.display(), "deleted input manifest");
    }

    Ok(result)
}

pub fn process_sheets(layout: &WorkLayout, sheets: Vec<Worksheet>) -> Result<ProcessingResult> {
    let sheet = single_worksheet(sheets)?;
    let outcome = process_worksheet(&sheet, &layout.output_dir)?;

    let run_id = RunId::new(file_safe_timestamp(Utc::now()));
    let output_file_name = run_id.csv_file_name();
    layout.ensure_processed_dir()?;
    let output_path = layout.processed_dir.join(&output_file_name);
    write_processed_csv(&output_path, &outcome.rows)?;

    info!(
        path = %output_path.display(),
        total_rows = outcome.summary.total_rows,
        successful_rows = outcome.summary.successful_rows,
        errors = outcome.summary.errors,
        not_found = outcome.summary.not_found,
        "manifest processed"
    );

    Ok(ProcessingResult {
        output_file_name,
        run_id,
        summary: outcome.summary,
        files: outcome.files,
    })
}

pub fn write_processed_csv(path: &Path, rows: &[ProcessedRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(PROCESSED_CSV_HEADERS)?;
    for row in rows {
        writer
            .write_record(row.to_record())
            .with_context(|| format!("failed to write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}
