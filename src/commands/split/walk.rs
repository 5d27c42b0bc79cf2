use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use lopdf::Document;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::fallback::FallbackSplitter;
use crate::pages::{PageFormat, count_tiff_frames, extract_pdf_page, extract_tiff_frame, load_pdf};
use crate::util::file_extension;

/// One single-page file written into the split tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitFile {
    pub original_path: PathBuf,
    pub split_path: PathBuf,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SplitOutcome {
    Success { pages: u32 },
    Fallback { pages: u32 },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSplit {
    pub path: PathBuf,
    pub outcome: SplitOutcome,
}

/// Counters accumulated over a walk of the canonical tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkTotals {
    pub original_files: usize,
    pub expected_splits: usize,
    pub generated_files: usize,
    pub split_errors: usize,
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub totals: WalkTotals,
    pub split_files: Vec<SplitFile>,
    pub files: Vec<FileSplit>,
}

/// Result of one file-level task, folded into the walk outcome in
/// completion order.
#[derive(Debug)]
struct FileReport {
    read: bool,
    expected: u32,
    split_files: Vec<SplitFile>,
    fallback_pages: u32,
    errors: usize,
    outcome: SplitOutcome,
    path: PathBuf,
}

impl FileReport {
    fn new(path: PathBuf) -> Self {
        Self {
            read: false,
            expected: 0,
            split_files: Vec::new(),
            fallback_pages: 0,
            errors: 0,
            outcome: SplitOutcome::Failed {
                reason: String::new(),
            },
            path,
        }
    }
}

/// Opened document ready for per-page extraction on the blocking pool.
#[derive(Clone)]
enum PageSource {
    Pdf(Arc<Document>),
    Tiff(Arc<Vec<u8>>),
}

impl PageSource {
    fn open(format: PageFormat, bytes: Vec<u8>) -> Result<(Self, u32)> {
        match format {
            PageFormat::Pdf => {
                let document = load_pdf(&bytes)?;
                let pages = document.get_pages().len() as u32;
                Ok((Self::Pdf(Arc::new(document)), pages))
            }
            PageFormat::Tiff => {
                let frames = count_tiff_frames(&bytes)?;
                Ok((Self::Tiff(Arc::new(bytes)), frames))
            }
        }
    }

    /// Page `page` (1-based) as a standalone document.
    fn extract(&self, page: u32) -> Result<Vec<u8>> {
        match self {
            Self::Pdf(document) => extract_pdf_page(document, page),
            Self::Tiff(bytes) => extract_tiff_frame(bytes, page - 1),
        }
    }
}

/// Walks the canonical tree and writes single-page files into a mirrored
/// split tree.
pub struct TreeSplitter {
    permits: Arc<Semaphore>,
    fallback: Arc<dyn FallbackSplitter>,
}

impl TreeSplitter {
    pub fn new(concurrency: usize, fallback: Arc<dyn FallbackSplitter>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            fallback,
        }
    }

    /// Processes every directory below `input_root` depth-first in name
    /// order: a directory's files run concurrently, then its subdirectories
    /// follow one at a time. Files directly in `input_root` are not split.
    pub async fn split_tree(&self, input_root: &Path, output_root: &Path) -> Result<WalkOutcome> {
        let mut outcome = WalkOutcome::default();
        fs::create_dir_all(output_root)
            .await
            .with_context(|| format!("failed to create {}", output_root.display()))?;

        let mut pending = match subdirectories(input_root, output_root).await {
            Ok(children) => children,
            Err(err) => {
                error!(dir = %input_root.display(), error = %format!("{err:#}"), "failed to read directory");
                return Ok(outcome);
            }
        };
        pending.reverse();

        while let Some((input_dir, output_dir)) = pending.pop() {
            fs::create_dir_all(&output_dir)
                .await
                .with_context(|| format!("failed to create {}", output_dir.display()))?;

            let files = match regular_files(&input_dir).await {
                Ok(files) => files,
                Err(err) => {
                    error!(dir = %input_dir.display(), error = %format!("{err:#}"), "failed to read directory");
                    continue;
                }
            };
            self.split_directory(files, &output_dir, &mut outcome).await?;

            let mut children = match subdirectories(&input_dir, &output_dir).await {
                Ok(children) => children,
                Err(err) => {
                    error!(dir = %input_dir.display(), error = %format!("{err:#}"), "failed to read directory");
                    continue;
                }
            };
            children.reverse();
            pending.extend(children);
        }

        Ok(outcome)
    }

    async fn split_directory(
        &self,
        files: Vec<PathBuf>,
        output_dir: &Path,
        outcome: &mut WalkOutcome,
    ) -> Result<()> {
        let mut tasks = JoinSet::new();
        for file in files {
            let permits = Arc::clone(&self.permits);
            let fallback = Arc::clone(&self.fallback);
            let output_dir = output_dir.to_path_buf();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|err| anyhow!("split permits closed: {err}"))?;
                Ok::<_, anyhow::Error>(split_file(file, output_dir, fallback).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let report = joined.context("split task panicked")??;
            if report.read {
                outcome.totals.original_files += 1;
            }
            outcome.totals.expected_splits += report.expected as usize;
            outcome.totals.generated_files +=
                report.split_files.len() + report.fallback_pages as usize;
            outcome.totals.split_errors += report.errors;
            outcome.split_files.extend(report.split_files);
            outcome.files.push(FileSplit {
                path: report.path,
                outcome: report.outcome,
            });
        }

        Ok(())
    }
}

async fn split_file(
    path: PathBuf,
    output_dir: PathBuf,
    fallback: Arc<dyn FallbackSplitter>,
) -> FileReport {
    let mut report = FileReport::new(path.clone());

    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(file = %path.display(), error = %err, "failed to read file");
            report.errors += 1;
            report.outcome = SplitOutcome::Failed {
                reason: format!("read failed: {err}"),
            };
            return report;
        }
    };
    report.read = true;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(format) = PageFormat::from_extension(&file_extension(&file_name)) else {
        warn!(file = %path.display(), "skipping unsupported file format");
        report.errors += 1;
        report.outcome = SplitOutcome::Failed {
            reason: "unsupported file format".to_string(),
        };
        return report;
    };

    match extract_pages(&path, format, bytes, &output_dir, &mut report).await {
        Ok(pages) => {
            report.outcome = SplitOutcome::Success { pages };
        }
        Err(err) => {
            error!(file = %path.display(), error = %format!("{err:#}"), "page extraction failed, trying fallback");
            report.errors += 1;
            report.outcome = run_fallback(&path, &output_dir, fallback, &mut report).await;
        }
    }

    report
}

async fn extract_pages(
    path: &Path,
    format: PageFormat,
    bytes: Vec<u8>,
    output_dir: &Path,
    report: &mut FileReport,
) -> Result<u32> {
    let (source, pages) = tokio::task::spawn_blocking(move || PageSource::open(format, bytes))
        .await
        .context("page counting task panicked")??;
    report.expected = pages;
    info!(file = %path.display(), pages, "splitting");

    for page in 1..=pages {
        let page_source = source.clone();
        let page_bytes = tokio::task::spawn_blocking(move || page_source.extract(page))
            .await
            .context("page extraction task panicked")??;

        let split_path = output_dir.join(split_file_name(path, page));
        fs::write(&split_path, page_bytes)
            .await
            .with_context(|| format!("failed to write {}", split_path.display()))?;
        info!(path = %split_path.display(), "saved split page");

        report.split_files.push(SplitFile {
            original_path: path.to_path_buf(),
            split_path,
            page,
        });
    }

    Ok(pages)
}

async fn run_fallback(
    path: &Path,
    output_dir: &Path,
    fallback: Arc<dyn FallbackSplitter>,
    report: &mut FileReport,
) -> SplitOutcome {
    let file = path.to_path_buf();
    let output_dir = output_dir.to_path_buf();
    let result = tokio::task::spawn_blocking(move || fallback.split(&file, &output_dir))
        .await
        .context("fallback task panicked")
        .and_then(|result| result);

    match result {
        Ok(pages) => {
            info!(file = %path.display(), pages, "fallback split succeeded");
            report.fallback_pages = pages;
            SplitOutcome::Fallback { pages }
        }
        Err(err) => {
            error!(file = %path.display(), error = %format!("{err:#}"), "fallback split failed");
            report.errors += 1;
            SplitOutcome::Failed {
                reason: format!("{err:#}"),
            }
        }
    }
}

/// `{stem}_{page}{ext}`, keeping the original extension as written.
pub fn split_file_name(original: &Path, page: u32) -> String {
    let stem = original
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    match original.extension() {
        Some(extension) => format!("{stem}_{page}.{}", extension.to_string_lossy()),
        None => format!("{stem}_{page}"),
    }
}

async fn sorted_entries(dir: &Path) -> Result<Vec<(PathBuf, std::fs::FileType)>> {
    let mut reader = fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read {}", dir.display()))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .with_context(|| format!("failed to read entry in {}", dir.display()))?
    {
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("failed to stat {}", entry.path().display()))?;
        entries.push((entry.path(), file_type));
    }
    entries.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(entries)
}

async fn regular_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(sorted_entries(dir)
        .await?
        .into_iter()
        .filter(|(_, file_type)| file_type.is_file())
        .map(|(path, _)| path)
        .collect())
}

async fn subdirectories(input_dir: &Path, output_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    Ok(sorted_entries(input_dir)
        .await?
        .into_iter()
        .filter(|(_, file_type)| file_type.is_dir())
        .filter_map(|(path, _)| {
            let name = path.file_name()?.to_os_string();
            Some((path, output_dir.join(name)))
        })
        .collect())
}
