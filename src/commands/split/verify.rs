use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use super::walk::SplitFile;
use crate::classify::TransactionClass;
use crate::paths::document_stem;
use crate::processed::ProcessedRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowVerification {
    pub row: usize,
    pub id_fund: String,
    pub id_ihno: String,
    pub split_pages: usize,
    pub status: String,
}

/// Sum of the numeric `page_count` cells; anything else counts as 0.
pub fn expected_pages_from_csv(records: &[ProcessedRecord]) -> usize {
    records
        .iter()
        .map(|record| match record.page_count.parse::<usize>() {
            Ok(pages) => pages,
            Err(_) => {
                warn!(
                    row = record.line,
                    page_count = %record.page_count,
                    "non-numeric page_count counted as 0"
                );
                0
            }
        })
        .sum()
}

/// Matches each CSV row to the split files whose origin is that row's copied
/// document.
pub fn verify_rows(records: &[ProcessedRecord], split_files: &[SplitFile]) -> Vec<RowVerification> {
    let mut pages_by_stem: HashMap<String, usize> = HashMap::new();
    for split in split_files {
        if let Some(stem) = split.original_path.file_stem() {
            *pages_by_stem
                .entry(stem.to_string_lossy().into_owned())
                .or_default() += 1;
        }
    }

    records
        .iter()
        .map(|record| {
            let class = TransactionClass::from_code(&record.id_trtype);
            let stem = document_stem(class, &record.id_fund, &record.id_ihno);
            let split_pages = pages_by_stem.get(&stem).copied().unwrap_or_default();
            let status = if split_pages > 0 {
                format!("Split into {split_pages} pages")
            } else {
                "Not split".to_string()
            };
            RowVerification {
                row: record.line,
                id_fund: record.id_fund.clone(),
                id_ihno: record.id_ihno.clone(),
                split_pages,
                status,
            }
        })
        .collect()
}
