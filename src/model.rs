use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const PROCESSED_CSV_PREFIX: &str = "processed_";
pub const PROCESSED_CSV_HEADERS: [&str; 6] = [
    "id_fund",
    "id_trtype",
    "id_ihno",
    "id_path",
    "id_acno",
    "page_count",
];

/// Identifies one Manifest Processor run; equal to the timestamp embedded in
/// the run's `processed_<run-id>.csv` file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_csv_name(file_name: &str) -> Option<Self> {
        file_name
            .strip_prefix(PROCESSED_CSV_PREFIX)
            .and_then(|rest| rest.strip_suffix(".csv"))
            .filter(|stamp| !stamp.is_empty())
            .map(Self::new)
    }

    pub fn csv_file_name(&self) -> String {
        format!("{PROCESSED_CSV_PREFIX}{}.csv", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audit tags recorded in place of a page count. The rendered strings are part
/// of the processed-rows CSV format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    #[serde(rename = "Missing serverId")]
    MissingServerId,
    #[serde(rename = "Missing drivePath")]
    MissingDrivePath,
    #[serde(rename = "Missing pathVal")]
    MissingPathVal,
    #[serde(rename = "Path Error")]
    PathError,
    #[serde(rename = "Not Found")]
    NotFound,
    #[serde(rename = "PDF Error")]
    PdfError,
    #[serde(rename = "Unsupported")]
    Unsupported,
    #[serde(rename = "Error")]
    Error,
}

impl FailureReason {
    pub const ALL: [FailureReason; 8] = [
        Self::MissingServerId,
        Self::MissingDrivePath,
        Self::MissingPathVal,
        Self::PathError,
        Self::NotFound,
        Self::PdfError,
        Self::Unsupported,
        Self::Error,
    ];

    pub fn as_tag(self) -> &'static str {
        match self {
            Self::MissingServerId => "Missing serverId",
            Self::MissingDrivePath => "Missing drivePath",
            Self::MissingPathVal => "Missing pathVal",
            Self::PathError => "Path Error",
            Self::NotFound => "Not Found",
            Self::PdfError => "PDF Error",
            Self::Unsupported => "Unsupported",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for FailureReason {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_tag() == trimmed)
            .ok_or_else(|| format!("unknown page-count tag '{trimmed}'"))
    }
}

/// Either the number of pages/frames of a copied file or the reason it could
/// not be counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageCount {
    Pages(u32),
    Failed(FailureReason),
}

impl PageCount {
    pub fn pages(self) -> Option<u32> {
        match self {
            Self::Pages(pages) => Some(pages),
            Self::Failed(_) => None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if let Ok(pages) = trimmed.parse::<u32>() {
            return Ok(Self::Pages(pages));
        }
        trimmed.parse::<FailureReason>().map(Self::Failed)
    }
}

impl fmt::Display for PageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pages(pages) => write!(f, "{pages}"),
            Self::Failed(reason) => f.write_str(reason.as_tag()),
        }
    }
}

/// One line of the processed-rows CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedRow {
    pub id_fund: String,
    pub id_trtype: String,
    pub id_ihno: String,
    pub id_path: String,
    pub id_acno: String,
    pub page_count: PageCount,
}

impl ProcessedRow {
    pub fn to_record(&self) -> [String; 6] {
        [
            self.id_fund.clone(),
            self.id_trtype.clone(),
            self.id_ihno.clone(),
            self.id_path.clone(),
            self.id_acno.clone(),
            self.page_count.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
    Executed,
    Updated,
    Skipped,
}

/// One audit-trail entry produced by the SQL-issuing stages. `row` is the
/// processed-CSV line number (header is row 1) or 0 for batch-level entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlLog {
    pub row: usize,
    pub status: LogStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl SqlLog {
    pub fn new(row: usize, status: LogStatus, message: impl Into<String>) -> Self {
        Self {
            row,
            status,
            message: message.into(),
            sql: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

/// Result object of a transactional stage: completes even when the work
/// itself failed, with the failure described in `logs`.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub result: Outcome,
    pub logs: Vec<SqlLog>,
}

impl StageReport {
    pub fn success(logs: Vec<SqlLog>) -> Self {
        Self {
            result: Outcome::Success,
            logs,
        }
    }

    pub fn failed(logs: Vec<SqlLog>) -> Self {
        Self {
            result: Outcome::Failed,
            logs,
        }
    }
}
