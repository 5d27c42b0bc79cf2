//! Reader for the processed-rows CSV shared by every downstream stage.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One data line of a processed-rows CSV, cells trimmed. Columns are matched
/// by header name; absent columns read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcessedRecord {
    /// File line number; the header is line 1.
    #[serde(skip)]
    pub line: usize,
    pub id_fund: String,
    pub id_trtype: String,
    pub id_ihno: String,
    /// Optional marker column; not written by the Manifest Processor.
    pub image: String,
    pub id_path: String,
    pub id_acno: String,
    pub page_count: String,
}

pub fn read_processed_csv(path: &Path) -> Result<Vec<ProcessedRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("failed to read {}", path.display()))?;
        let mut record: ProcessedRecord = row
            .deserialize(Some(&headers))
            .with_context(|| format!("malformed row {} in {}", index + 2, path.display()))?;
        record.line = row
            .position()
            .map(|position| position.line() as usize)
            .unwrap_or(index + 2);
        records.push(record);
    }

    Ok(records)
}
