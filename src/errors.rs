use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Typed failures raised by the intake stages.
///
/// Only the structural variants abort a command; row-level problems are
/// recorded as [`crate::model::FailureReason`] values instead.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("invalid fund ({fund}) or transaction number ({txn_number}) for file path")]
    InvalidPath { fund: String, txn_number: String },
    #[error("no processed_*.csv found in {}", .0.display())]
    NoProcessedCsv(PathBuf),
    #[error("timed out after {0:?} waiting for a store connection")]
    PoolTimeout(Duration),
    #[error("invalid cutoff timestamp '{0}'")]
    InvalidCutoff(String),
}
