use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use calamine::{DataType, Reader, open_workbook_auto};

use crate::errors::IntakeError;

pub const REQUIRED_HEADERS: [&str; 7] = [
    "id_fund",
    "id_trtype",
    "id_ihno",
    "id_path",
    "id_acno",
    "id_serverip",
    "id_drivepath",
];

/// Cell text of one worksheet. `first_row` is the 1-based worksheet row
/// number of `rows[0]` (the header row).
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    pub name: String,
    pub first_row: usize,
    pub rows: Vec<Vec<String>>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            first_row: 1,
            rows,
        }
    }
}

/// Reads every worksheet of an xlsx/xls/ods workbook as display text.
pub fn load_workbook(path: &Path) -> Result<Vec<Worksheet>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let Some(range) = workbook.worksheet_range(&name) else {
            continue;
        };
        let range =
            range.with_context(|| format!("failed to read worksheet '{name}' in {}", path.display()))?;

        let first_row = range
            .start()
            .map(|(row, _)| row as usize + 1)
            .unwrap_or(1);
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        sheets.push(Worksheet {
            name,
            first_row,
            rows,
        });
    }

    Ok(sheets)
}

fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::String(text) => text.trim().to_string(),
        DataType::Float(value) => format!("{value}"),
        DataType::Int(value) => format!("{value}"),
        DataType::Bool(value) => value.to_string(),
        DataType::DateTime(value) => format!("{value}"),
        DataType::DateTimeIso(text) | DataType::DurationIso(text) => text.trim().to_string(),
        DataType::Duration(value) => format!("{value}"),
        DataType::Error(err) => err.to_string(),
        DataType::Empty => String::new(),
    }
}

/// Column positions of the required headers.
#[derive(Debug, Clone)]
pub struct ManifestColumns {
    indices: HashMap<&'static str, usize>,
}

impl ManifestColumns {
    /// Matches headers case-insensitively after trimming.
    pub fn from_header(header: &[String]) -> Result<Self, IntakeError> {
        let mut indices = HashMap::new();
        for (position, cell) in header.iter().enumerate() {
            let normalized = cell.trim().to_lowercase();
            if let Some(required) = REQUIRED_HEADERS
                .into_iter()
                .find(|required| *required == normalized)
            {
                indices.entry(required).or_insert(position);
            }
        }

        let missing: Vec<&str> = REQUIRED_HEADERS
            .into_iter()
            .filter(|required| !indices.contains_key(required))
            .collect();
        if !missing.is_empty() {
            return Err(IntakeError::InvalidManifest(format!(
                "missing required headers: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { indices })
    }

    /// Trimmed text of `header` in `row`; empty when the row is short.
    pub fn cell<'row>(&self, row: &'row [String], header: &str) -> &'row str {
        self.indices
            .get(header)
            .and_then(|index| row.get(*index))
            .map(|value| value.trim())
            .unwrap_or_default()
    }
}

/// The single worksheet of a manifest, or `InvalidManifest`.
pub fn single_worksheet(mut sheets: Vec<Worksheet>) -> Result<Worksheet, IntakeError> {
    match sheets.len() {
        0 => Err(IntakeError::InvalidManifest(
            "no worksheets found in workbook".to_string(),
        )),
        1 => Ok(sheets.remove(0)),
        count => Err(IntakeError::InvalidManifest(format!(
            "workbook contains {count} worksheets; only one is allowed"
        ))),
    }
}
