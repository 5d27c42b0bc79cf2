use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::fallback::{ExternalSplitter, FallbackSplitter};
use super::verify::{RowVerification, expected_pages_from_csv, verify_rows};
use super::walk::{FileSplit, SplitFile, TreeSplitter};
use crate::cli::SplitArgs;
use crate::commands::emit_report;
use crate::config::{WorkLayout, latest_processed_csv};
use crate::model::RunId;
use crate::processed::read_processed_csv;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitSummary {
    pub total_original_files_processed: usize,
    pub total_expected_splits: usize,
    pub total_split_files_generated: usize,
    pub split_errors: usize,
    pub total_expected_pages_from_csv: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitResult {
    pub run_id: Option<RunId>,
    pub summary: SplitSummary,
    pub split_files: Vec<SplitFile>,
    pub files: Vec<FileSplit>,
    pub verification: Vec<RowVerification>,
}

pub fn run(args: SplitArgs) -> Result<()> {
    let layout = WorkLayout::new(&args.workspace.work_root);
    let fallback = Arc::new(ExternalSplitter::new(
        args.fallback_program,
        args.fallback_script,
    )?);
    let run_id = args.run_id.map(RunId::new);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(split_all(
        &layout,
        run_id.as_ref(),
        args.concurrency,
        fallback,
    ))?;

    emit_report(&layout, "split", &result)
}

/// Splits every copied document under the canonical tree and cross-checks
/// the output against the run's processed-rows CSV. Count mismatches are
/// only logged.
pub async fn split_all(
    layout: &WorkLayout,
    run_id: Option<&RunId>,
    concurrency: usize,
    fallback: Arc<dyn FallbackSplitter>,
) -> Result<SplitResult> {
    let csv_path = match run_id {
        Some(run_id) => Some(layout.processed_csv(Some(run_id))?),
        None => latest_processed_csv(&layout.processed_dir)?,
    };

    info!(
        input = %layout.output_dir.display(),
        output = %layout.split_dir.display(),
        concurrency,
        "starting file splitting"
    );
    let splitter = TreeSplitter::new(concurrency, fallback);
    let mut walk = splitter
        .split_tree(&layout.output_dir, &layout.split_dir)
        .await?;
    walk.split_files
        .sort_by(|left, right| (&left.original_path, left.page).cmp(&(&right.original_path, right.page)));
    walk.files.sort_by(|left, right| left.path.cmp(&right.path));

    let (expected_pages, verification) = match &csv_path {
        Some(path) => {
            info!(path = %path.display(), "verifying split output against processed csv");
            let records = read_processed_csv(path)?;
            (
                expected_pages_from_csv(&records),
                verify_rows(&records, &walk.split_files),
            )
        }
        None => {
            warn!(dir = %layout.processed_dir.display(), "no processed csv found, skipping verification");
            (0, Vec::new())
        }
    };

    let summary = SplitSummary {
        total_original_files_processed: walk.totals.original_files,
        total_expected_splits: walk.totals.expected_splits,
        total_split_files_generated: walk.totals.generated_files,
        split_errors: walk.totals.split_errors,
        total_expected_pages_from_csv: expected_pages,
    };
    warn_on_mismatch(&summary);

    info!(
        files = summary.total_original_files_processed,
        generated = summary.total_split_files_generated,
        errors = summary.split_errors,
        "file splitting complete"
    );

    Ok(SplitResult {
        run_id: csv_path
            .as_deref()
            .and_then(|path| path.file_name())
            .and_then(|name| RunId::from_csv_name(&name.to_string_lossy())),
        summary,
        split_files: walk.split_files,
        files: walk.files,
        verification,
    })
}

fn warn_on_mismatch(summary: &SplitSummary) {
    if summary.total_expected_splits != summary.total_expected_pages_from_csv {
        warn!(
            expected_splits = summary.total_expected_splits,
            expected_from_csv = summary.total_expected_pages_from_csv,
            "expected splits differ from csv page counts"
        );
    }
    if summary.total_split_files_generated != summary.total_expected_splits {
        warn!(
            generated = summary.total_split_files_generated,
            expected_splits = summary.total_expected_splits,
            "generated split files differ from expected splits"
        );
    }
    if summary.total_split_files_generated != summary.total_expected_pages_from_csv {
        warn!(
            generated = summary.total_split_files_generated,
            expected_from_csv = summary.total_expected_pages_from_csv,
            "generated split files differ from csv page counts"
        );
    }
}
