use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::info;

/// Splits a file the in-process extractors could not handle, writing pages
/// into `output_dir`. Returns the number of pages it reports.
pub trait FallbackSplitter: Send + Sync {
    fn split(&self, file: &Path, output_dir: &Path) -> Result<u32>;
}

/// Runs an external splitter script as `<program> <script> <file> <output_dir>`.
#[derive(Debug, Clone)]
pub struct ExternalSplitter {
    program: String,
    script: PathBuf,
    count_pattern: Regex,
}

impl ExternalSplitter {
    pub fn new(program: impl Into<String>, script: impl Into<PathBuf>) -> Result<Self> {
        let count_pattern = Regex::new(r"Split (\d+) pages successfully")
            .context("failed to compile fallback split-count regex")?;
        Ok(Self {
            program: program.into(),
            script: script.into(),
            count_pattern,
        })
    }

    /// Page count announced on stdout; 1 when the line is absent.
    pub fn parse_split_count(&self, stdout: &str) -> u32 {
        self.count_pattern
            .captures(stdout)
            .and_then(|captures| captures[1].parse().ok())
            .unwrap_or(1)
    }
}

impl FallbackSplitter for ExternalSplitter {
    fn split(&self, file: &Path, output_dir: &Path) -> Result<u32> {
        let output = Command::new(&self.program)
            .arg(&self.script)
            .arg(file)
            .arg(output_dir)
            .output()
            .with_context(|| {
                format!(
                    "failed to start fallback splitter {} {}",
                    self.program,
                    self.script.display()
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            bail!(
                "fallback splitter exited with {} for {}: {}",
                output.status,
                file.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!(file = %file.display(), stdout = %stdout.trim(), "fallback splitter finished");
        Ok(self.parse_split_count(&stdout))
    }
}
