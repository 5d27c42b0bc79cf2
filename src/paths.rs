//! Source and destination path resolution for manifest rows.
//!
//! Source paths arrive in the legacy Windows file-share form (`server\share\...`)
//! and are normalized in that form before being mapped onto the host's
//! separators. Destination paths follow the canonical
//! `CLIENT_CODE_{fund}/CLIENT_CODE_{fund}_TRANSACTION_NUMBER_{txn}/` layout.

use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use crate::classify::TransactionClass;
use crate::errors::IntakeError;
use crate::util::ensure_directory;

const UNSAFE_PATH_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

/// Joins server and relative path with a backslash, normalizes the result and
/// applies the share substitution. Returns the legacy (backslash) form.
pub fn resolve_source_legacy(server_id: &str, drive_path: &str, relative_path: &str) -> String {
    let joined = format!("{server_id}\\{relative_path}");
    let normalized = normalize_legacy_path(&joined);

    if normalized.contains("image") {
        normalized.replace("image", drive_path)
    } else if normalized.contains("common") {
        normalized.replace("common", drive_path)
    } else {
        normalized
    }
}

/// Host path for the resolved source file.
pub fn resolve_source(server_id: &str, drive_path: &str, relative_path: &str) -> PathBuf {
    to_host_path(&resolve_source_legacy(server_id, drive_path, relative_path))
}

/// Collapses separators, `.` and `..` segments. A leading double separator
/// (UNC share) or single separator (rooted path) is kept; `..` segments that
/// would climb above the start are dropped.
pub fn normalize_legacy_path(raw: &str) -> String {
    let unified = raw.replace('/', "\\");
    let leading = unified.chars().take_while(|ch| *ch == '\\').count();
    let prefix = match leading {
        0 => "",
        1 => "\\",
        _ => "\\\\",
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('\\') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    format!("{prefix}{}", segments.join("\\"))
}

pub fn to_host_path(legacy: &str) -> PathBuf {
    if MAIN_SEPARATOR == '\\' {
        PathBuf::from(legacy)
    } else {
        PathBuf::from(legacy.replace('\\', &MAIN_SEPARATOR.to_string()))
    }
}

pub fn fund_folder_name(fund: &str) -> String {
    format!("CLIENT_CODE_{fund}")
}

/// Name shared by the transaction folder and the copied file's stem.
pub fn document_stem(class: TransactionClass, fund: &str, txn_number: &str) -> String {
    let kind = if class.is_batch() {
        "BATCH"
    } else {
        "TRANSACTION"
    };
    format!("CLIENT_CODE_{fund}_{kind}_NUMBER_{txn_number}")
}

pub fn validate_identifiers(fund: &str, txn_number: &str) -> Result<(), IntakeError> {
    let unsafe_value = |value: &str| value.is_empty() || value.contains(UNSAFE_PATH_CHARS);
    if unsafe_value(fund) || unsafe_value(txn_number) {
        return Err(IntakeError::InvalidPath {
            fund: fund.to_string(),
            txn_number: txn_number.to_string(),
        });
    }
    Ok(())
}

/// Builds the canonical destination file path under `base`, creating both
/// directory levels. `extension` includes its leading dot (or is empty).
pub fn resolve_destination(
    base: &Path,
    class: TransactionClass,
    fund: &str,
    txn_number: &str,
    extension: &str,
) -> anyhow::Result<PathBuf> {
    validate_identifiers(fund, txn_number)?;

    let stem = document_stem(class, fund, txn_number);
    let folder = base.join(fund_folder_name(fund)).join(&stem);
    ensure_directory(&folder)?;

    Ok(folder.join(format!("{stem}{extension}")))
}
