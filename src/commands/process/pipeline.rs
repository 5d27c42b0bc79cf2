use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::sheet::{ManifestColumns, Worksheet};
use crate::classify::TransactionClass;
use crate::errors::IntakeError;
use crate::model::{FailureReason, PageCount, ProcessedRow};
use crate::pages::{PageFormat, count_pdf_pages, count_tiff_frames};
use crate::paths::{resolve_destination, resolve_source};
use crate::util::file_extension;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSummary {
    pub total_rows: usize,
    pub successful_rows: usize,
    pub errors: usize,
    pub not_found: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopiedFile {
    pub row: usize,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub page_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SheetOutcome {
    pub rows: Vec<ProcessedRow>,
    pub summary: ProcessingSummary,
    pub files: Vec<CopiedFile>,
}

/// One data row of the manifest, cells already trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub row_number: usize,
    pub fund: String,
    pub trtype: String,
    pub txn_number: String,
    pub server_id: String,
    pub drive_path: String,
    pub relative_path: String,
    pub account: String,
}

impl ManifestRow {
    fn read(columns: &ManifestColumns, row_number: usize, cells: &[String]) -> Self {
        Self {
            row_number,
            fund: columns.cell(cells, "id_fund").to_string(),
            trtype: columns.cell(cells, "id_trtype").to_string(),
            txn_number: columns.cell(cells, "id_ihno").to_string(),
            server_id: columns.cell(cells, "id_serverip").to_string(),
            drive_path: columns.cell(cells, "id_drivepath").to_string(),
            relative_path: columns.cell(cells, "id_path").to_string(),
            account: columns.cell(cells, "id_acno").to_string(),
        }
    }

    fn processed(&self, class: TransactionClass, page_count: PageCount) -> ProcessedRow {
        ProcessedRow {
            id_fund: self.fund.clone(),
            id_trtype: class.code().to_string(),
            id_ihno: self.txn_number.clone(),
            id_path: self.relative_path.clone(),
            id_acno: self.account.clone(),
            page_count,
        }
    }
}

enum RowKind {
    Success(CopiedFile),
    Failed,
    NotFound,
}

struct RowOutcome {
    row: ProcessedRow,
    kind: RowKind,
}

impl RowOutcome {
    fn failed(row: ProcessedRow) -> Self {
        Self {
            row,
            kind: RowKind::Failed,
        }
    }
}

/// Processes every data row of `sheet`, copying found files under
/// `output_dir`. Per-row problems never abort; only a bad header does.
pub fn process_worksheet(sheet: &Worksheet, output_dir: &Path) -> Result<SheetOutcome> {
    let Some((header, data_rows)) = sheet.rows.split_first() else {
        return Err(IntakeError::InvalidManifest(format!(
            "worksheet '{}' has no header row",
            sheet.name
        ))
        .into());
    };
    let columns = ManifestColumns::from_header(header)?;

    info!(worksheet = %sheet.name, rows = data_rows.len(), "processing manifest rows");

    let mut outcome = SheetOutcome::default();
    for (offset, cells) in data_rows.iter().enumerate() {
        let row_number = sheet.first_row + offset + 1;
        if columns.cell(cells, "id_fund").is_empty() {
            info!(row = row_number, "empty or invalid row, skipping");
            continue;
        }

        outcome.summary.total_rows += 1;
        let manifest_row = ManifestRow::read(&columns, row_number, cells);
        let class = TransactionClass::from_raw(&manifest_row.trtype);

        let row_outcome = match process_row(&manifest_row, class, output_dir) {
            Ok(row_outcome) => row_outcome,
            Err(err) => {
                warn!(row = row_number, error = %format!("{err:#}"), "row processing failed");
                RowOutcome::failed(
                    manifest_row.processed(class, PageCount::Failed(FailureReason::Error)),
                )
            }
        };

        match row_outcome.kind {
            RowKind::Success(file) => {
                outcome.summary.successful_rows += 1;
                outcome.files.push(file);
            }
            RowKind::Failed => outcome.summary.errors += 1,
            RowKind::NotFound => outcome.summary.not_found += 1,
        }
        outcome.rows.push(row_outcome.row);
    }

    Ok(outcome)
}

fn process_row(
    row: &ManifestRow,
    class: TransactionClass,
    output_dir: &Path,
) -> Result<RowOutcome> {
    let missing = if row.server_id.is_empty() {
        Some(FailureReason::MissingServerId)
    } else if row.drive_path.is_empty() {
        Some(FailureReason::MissingDrivePath)
    } else if row.relative_path.is_empty() {
        Some(FailureReason::MissingPathVal)
    } else {
        None
    };
    if let Some(reason) = missing {
        info!(row = row.row_number, reason = %reason, "required cell is empty");
        return Ok(RowOutcome::failed(
            row.processed(class, PageCount::Failed(reason)),
        ));
    }

    let source = resolve_source(&row.server_id, &row.drive_path, &row.relative_path);
    let extension = file_extension(&row.relative_path);
    info!(row = row.row_number, source = %source.display(), extension = %extension, "resolved source");

    if !source.exists() {
        info!(row = row.row_number, source = %source.display(), "file not found");
        return Ok(RowOutcome {
            row: row.processed(class, PageCount::Failed(FailureReason::NotFound)),
            kind: RowKind::NotFound,
        });
    }

    let bytes =
        fs::read(&source).with_context(|| format!("failed to read {}", source.display()))?;

    let destination = match resolve_destination(
        output_dir,
        class,
        &row.fund,
        &row.txn_number,
        &extension,
    ) {
        Ok(destination) => destination,
        Err(err) if err.downcast_ref::<IntakeError>().is_some() => {
            warn!(row = row.row_number, error = %err, "path error");
            return Ok(RowOutcome::failed(
                row.processed(class, PageCount::Failed(FailureReason::PathError)),
            ));
        }
        Err(err) => return Err(err),
    };

    fs::write(&destination, &bytes)
        .with_context(|| format!("failed to write {}", destination.display()))?;
    info!(row = row.row_number, destination = %destination.display(), "copied file");

    let page_count = count_pages(&extension, &bytes, row.row_number);
    let processed = row.processed(class, page_count);
    match page_count {
        PageCount::Pages(pages) => {
            info!(row = row.row_number, pages, "counted pages");
            Ok(RowOutcome {
                row: processed,
                kind: RowKind::Success(CopiedFile {
                    row: row.row_number,
                    source_path: source,
                    destination_path: destination,
                    page_count: pages,
                }),
            })
        }
        PageCount::Failed(reason) => {
            info!(row = row.row_number, reason = %reason, "page count unavailable");
            Ok(RowOutcome::failed(processed))
        }
    }
}

fn count_pages(extension: &str, bytes: &[u8], row_number: usize) -> PageCount {
    let counted = match PageFormat::from_extension(extension) {
        Some(PageFormat::Tiff) => count_tiff_frames(bytes),
        Some(PageFormat::Pdf) => count_pdf_pages(bytes),
        None => return PageCount::Failed(FailureReason::Unsupported),
    };

    match counted {
        Ok(pages) => PageCount::Pages(pages),
        Err(err) => {
            warn!(row = row_number, error = %format!("{err:#}"), "page count error");
            if extension == ".pdf" {
                PageCount::Failed(FailureReason::PdfError)
            } else {
                PageCount::Failed(FailureReason::Unsupported)
            }
        }
    }
}
