use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};

use super::*;
use crate::commands::process::{Worksheet, process_sheets};
use crate::config::WorkLayout;
use crate::pages::fixtures::{bilevel_tiff, pdf_with_pages, tiff_with_frames};
use crate::pages::{count_pdf_pages, count_tiff_frames};
use crate::processed::ProcessedRecord;

struct RecordingFallback {
    pages: Option<u32>,
    calls: AtomicUsize,
}

impl RecordingFallback {
    fn returning(pages: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FallbackSplitter for RecordingFallback {
    fn split(&self, _file: &Path, _output_dir: &Path) -> Result<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages.ok_or_else(|| anyhow!("fallback unavailable"))
    }
}

fn place(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().expect("fixture has parent")).expect("fixture dirs");
    fs::write(path, bytes).expect("fixture file");
}

fn manifest_row(server: &Path) -> Vec<Vec<String>> {
    let to_strings =
        |cells: &[&str]| -> Vec<String> { cells.iter().map(|cell| cell.to_string()).collect() };
    vec![
        to_strings(&[
            "id_fund",
            "id_trtype",
            "id_ihno",
            "id_path",
            "id_acno",
            "id_serverip",
            "id_drivepath",
        ]),
        to_strings(&[
            "150",
            "NEW",
            "1001",
            "image/docs/doc.pdf",
            "AC-9",
            &server.display().to_string(),
            "scans",
        ]),
    ]
}

#[tokio::test]
async fn splits_processed_pdf_and_matches_csv() {
    let work = tempfile::tempdir().expect("work dir");
    let server = tempfile::tempdir().expect("server dir");
    place(&server.path().join("scans/docs/doc.pdf"), &pdf_with_pages(3));

    let layout = WorkLayout::new(work.path());
    let processed = process_sheets(&layout, vec![Worksheet::new("Sheet1", manifest_row(server.path()))])
        .expect("manifest processes");

    let fallback = RecordingFallback::returning(Some(1));
    let result = split_all(&layout, None, 100, fallback.clone())
        .await
        .expect("split succeeds");

    assert_eq!(result.run_id, Some(processed.run_id));
    assert_eq!(result.summary.total_original_files_processed, 1);
    assert_eq!(result.summary.total_expected_splits, 3);
    assert_eq!(result.summary.total_split_files_generated, 3);
    assert_eq!(result.summary.total_expected_pages_from_csv, 3);
    assert_eq!(result.summary.split_errors, 0);
    assert_eq!(fallback.calls(), 0);

    let split_dir = layout
        .split_dir
        .join("CLIENT_CODE_150")
        .join("CLIENT_CODE_150_TRANSACTION_NUMBER_1001");
    for (index, split) in result.split_files.iter().enumerate() {
        let page = index as u32 + 1;
        assert_eq!(split.page, page);
        assert_eq!(
            split.split_path,
            split_dir.join(format!("CLIENT_CODE_150_TRANSACTION_NUMBER_1001_{page}.pdf"))
        );
        let bytes = fs::read(&split.split_path).expect("split file exists");
        assert_eq!(count_pdf_pages(&bytes).expect("split file is a PDF"), 1);
    }

    assert_eq!(result.verification.len(), 1);
    assert_eq!(result.verification[0].status, "Split into 3 pages");
    assert_eq!(
        result.files[0].outcome,
        SplitOutcome::Success { pages: 3 }
    );
}

#[tokio::test]
async fn splits_tiff_frames_into_standalone_files() {
    let work = tempfile::tempdir().expect("work dir");
    let layout = WorkLayout::new(work.path());
    let source = layout
        .output_dir
        .join("CLIENT_CODE_7")
        .join("CLIENT_CODE_7_TRANSACTION_NUMBER_5")
        .join("CLIENT_CODE_7_TRANSACTION_NUMBER_5.tif");
    place(&source, &tiff_with_frames(2));

    let result = split_all(&layout, None, 4, RecordingFallback::returning(None))
        .await
        .expect("split succeeds");

    assert_eq!(result.summary.total_split_files_generated, 2);
    assert_eq!(result.summary.total_expected_pages_from_csv, 0);
    assert!(result.verification.is_empty());
    assert!(result.run_id.is_none());
    for split in &result.split_files {
        assert!(
            split
                .split_path
                .ends_with(format!("CLIENT_CODE_7_TRANSACTION_NUMBER_5_{}.tif", split.page))
        );
        let bytes = fs::read(&split.split_path).expect("split file exists");
        assert_eq!(count_tiff_frames(&bytes).expect("split file is a TIFF"), 1);
    }
}

#[tokio::test]
async fn splits_bilevel_scans_without_fallback() {
    let work = tempfile::tempdir().expect("work dir");
    let layout = WorkLayout::new(work.path());
    let source = layout
        .output_dir
        .join("CLIENT_CODE_8")
        .join("CLIENT_CODE_8_TRANSACTION_NUMBER_3")
        .join("CLIENT_CODE_8_TRANSACTION_NUMBER_3.tif");
    place(&source, &bilevel_tiff(&[[0xFF, 0x00], [0x0F, 0xF0]]));

    let fallback = RecordingFallback::returning(None);
    let result = split_all(&layout, None, 4, fallback.clone())
        .await
        .expect("split succeeds");

    assert_eq!(fallback.calls(), 0);
    assert_eq!(result.summary.split_errors, 0);
    assert_eq!(result.summary.total_expected_splits, 2);
    assert_eq!(result.summary.total_split_files_generated, 2);
    assert_eq!(result.files[0].outcome, SplitOutcome::Success { pages: 2 });
    for split in &result.split_files {
        let bytes = fs::read(&split.split_path).expect("split file exists");
        assert_eq!(count_tiff_frames(&bytes).expect("split file is a TIFF"), 1);
    }
}

#[tokio::test]
async fn extraction_failure_falls_back_and_counts_errors() {
    let work = tempfile::tempdir().expect("work dir");
    let layout = WorkLayout::new(work.path());
    let folder = layout.output_dir.join("CLIENT_CODE_1").join("CLIENT_CODE_1_TRANSACTION_NUMBER_2");
    place(&folder.join("CLIENT_CODE_1_TRANSACTION_NUMBER_2.pdf"), b"%PDF-1.4 broken");

    let rescued = RecordingFallback::returning(Some(4));
    let result = split_all(&layout, None, 100, rescued.clone())
        .await
        .expect("split completes");
    assert_eq!(rescued.calls(), 1);
    assert_eq!(result.summary.split_errors, 1);
    assert_eq!(result.summary.total_split_files_generated, 4);
    assert_eq!(result.summary.total_expected_splits, 0);
    assert_eq!(result.files[0].outcome, SplitOutcome::Fallback { pages: 4 });

    let failing = RecordingFallback::returning(None);
    let result = split_all(&layout, None, 100, failing.clone())
        .await
        .expect("split completes");
    assert_eq!(failing.calls(), 1);
    assert_eq!(result.summary.split_errors, 2);
    assert_eq!(result.summary.total_split_files_generated, 0);
    assert!(matches!(result.files[0].outcome, SplitOutcome::Failed { .. }));
}

#[tokio::test]
async fn unsupported_files_count_errors_without_fallback() {
    let work = tempfile::tempdir().expect("work dir");
    let layout = WorkLayout::new(work.path());
    place(&layout.output_dir.join("CLIENT_CODE_1").join("notes.docx"), b"PK");
    place(&layout.output_dir.join("stray.pdf"), &pdf_with_pages(2));

    let fallback = RecordingFallback::returning(Some(1));
    let result = split_all(&layout, None, 100, fallback.clone())
        .await
        .expect("split completes");

    assert_eq!(fallback.calls(), 0);
    assert_eq!(result.summary.total_original_files_processed, 1);
    assert_eq!(result.summary.split_errors, 1);
    assert_eq!(result.summary.total_split_files_generated, 0);
    assert!(result.split_files.is_empty());
}

#[tokio::test]
async fn missing_canonical_tree_yields_empty_summary() {
    let work = tempfile::tempdir().expect("work dir");
    let layout = WorkLayout::new(work.path());

    let result = split_all(&layout, None, 100, RecordingFallback::returning(None))
        .await
        .expect("split completes");
    assert_eq!(result.summary, SplitSummary::default());
}

#[test]
fn fallback_count_defaults_to_one() {
    let splitter = ExternalSplitter::new("python3", "fallback_split.py").expect("splitter builds");
    assert_eq!(splitter.parse_split_count("Split 7 pages successfully.\n"), 7);
    assert_eq!(splitter.parse_split_count("Not a multi-page TIFF."), 1);
    assert_eq!(splitter.parse_split_count(""), 1);
}

fn shell_splitter(dir: &Path, body: &str) -> ExternalSplitter {
    let script = dir.join("split.sh");
    fs::write(&script, body).expect("script file");
    ExternalSplitter::new("sh", script).expect("splitter builds")
}

#[test]
fn external_splitter_reports_announced_page_count() {
    let dir = tempfile::tempdir().expect("temp dir");
    let splitter = shell_splitter(
        dir.path(),
        "test -f \"$1\" || exit 2\nmkdir -p \"$2\"\necho \"Split 3 pages successfully.\"\n",
    );
    let input = dir.path().join("scan.tif");
    fs::write(&input, b"II*\0").expect("input file");
    let output_dir = dir.path().join("pages");

    let pages = splitter.split(&input, &output_dir).expect("script succeeds");
    assert_eq!(pages, 3);
    assert!(output_dir.is_dir());
}

#[test]
fn external_splitter_failure_carries_exit_status_and_stderr() {
    let dir = tempfile::tempdir().expect("temp dir");
    let splitter = shell_splitter(dir.path(), "echo \"cannot read input\" >&2\nexit 1\n");

    let err = splitter
        .split(&dir.path().join("scan.tif"), dir.path())
        .expect_err("script fails");
    let message = format!("{err:#}");
    assert!(message.contains("exited with"), "{message}");
    assert!(message.contains("cannot read input"), "{message}");
}

#[test]
fn external_splitter_without_program_fails_to_start() {
    let splitter = ExternalSplitter::new("scan-intake-no-such-program", "split.py")
        .expect("splitter builds");
    let err = splitter
        .split(Path::new("scan.tif"), Path::new("."))
        .expect_err("program is missing");
    assert!(format!("{err:#}").contains("failed to start fallback splitter"));
}

#[test]
fn csv_page_total_ignores_failure_tags() {
    let record = |page_count: &str| ProcessedRecord {
        page_count: page_count.to_string(),
        ..ProcessedRecord::default()
    };
    let records = [record("3"), record("Not Found"), record("2"), record("")];
    assert_eq!(super::verify::expected_pages_from_csv(&records), 5);
}
