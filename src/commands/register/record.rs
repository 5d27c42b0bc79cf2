use rusqlite::ToSql;
use rusqlite::types::Null;

use super::parse::TransactionTuple;
use crate::classify::TransactionClass;
use crate::model::PageCount;
use crate::paths::{document_stem, fund_folder_name};
use crate::util::file_extension;

pub const STORAGE_PREFIX: &str = "aif-in-a-box-assets-prod: Data/APPLICATION_FORMS";
pub const DOCUMENT_ACTIVITY: &str = "Image Upload";
pub const DOCUMENT_STATUS: &str = "A";
pub const SYSTEM_ACTOR: &str = "system";

pub const INSERT_COLUMNS: &str = "document_process, document_activity, document_type, document_format, document_path,
folio_id, transaction_reference_id, document_status, mime_type,
user_attr0, user_attr1, user_attr2, user_attr3, user_attr4,
user_attr5, user_attr6, user_attr7, user_attr8, user_attr9,
approval_status, approved_by, approved_on, comments, audit_code,
del_flag, last_update_tms, last_updated_by, creation_date, created_by,
page_count, client_id";

/// Why a transaction produces no registration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSkip {
    /// The row carries a failure tag instead of a page count.
    NoPageCount(String),
    InvalidExtension,
}

/// Row shape inserted into the registered-document table. Columns not held
/// here are always NULL (or the fixed audit values).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub document_process: String,
    pub document_type: String,
    pub document_format: String,
    pub document_path: String,
    pub transaction_reference_id: String,
    pub mime_type: &'static str,
    pub user_attr1: String,
    pub user_attr2: String,
    pub timestamp: String,
    pub page_count: i64,
    pub client_id: Option<i64>,
}

impl RegistrationRecord {
    pub fn from_transaction(tuple: &TransactionTuple, timestamp: &str) -> Result<Self, RecordSkip> {
        let page_count = match tuple.page_count {
            PageCount::Pages(pages) => i64::from(pages),
            PageCount::Failed(reason) => return Err(RecordSkip::NoPageCount(reason.to_string())),
        };

        let extension = file_extension(&tuple.id_path);
        let bare_extension = extension.trim_start_matches('.');
        if bare_extension.is_empty() {
            return Err(RecordSkip::InvalidExtension);
        }

        let class = TransactionClass::from_code(&tuple.id_trtype);
        let fund = tuple.id_fund.to_string();
        let txn_number = tuple.id_ihno.to_string();

        Ok(Self {
            document_process: class.code().to_string(),
            document_type: class.label().to_string(),
            document_format: bare_extension.to_ascii_uppercase(),
            document_path: storage_path(class, &fund, &txn_number, &extension),
            transaction_reference_id: txn_number.clone(),
            mime_type: mime_type_for(bare_extension),
            user_attr1: txn_number,
            user_attr2: tuple.id_acno.clone(),
            timestamp: timestamp.to_string(),
            page_count,
            client_id: encode_fund_code(&fund),
        })
    }

    /// Parenthesized SQL literal tuple for a multi-row INSERT.
    pub fn sql_values(&self) -> String {
        let client_id = self
            .client_id
            .map_or_else(|| "NULL".to_string(), |id| id.to_string());
        format!(
            "(\n{}, {}, {}, {}, {},\nNULL, {}, {}, {},\nNULL, {}, {}, NULL, NULL,\nNULL, NULL, NULL, NULL, NULL,\nNULL, NULL, NULL, NULL, NULL,\nFALSE, {}, {}, {}, {},\n{}, {}\n)",
            quote(&self.document_process),
            quote(DOCUMENT_ACTIVITY),
            quote(&self.document_type),
            quote(&self.document_format),
            quote(&self.document_path),
            quote(&self.transaction_reference_id),
            quote(DOCUMENT_STATUS),
            quote(self.mime_type),
            quote(&self.user_attr1),
            quote(&self.user_attr2),
            quote(&self.timestamp),
            quote(SYSTEM_ACTOR),
            quote(&self.timestamp),
            quote(SYSTEM_ACTOR),
            self.page_count,
            client_id,
        )
    }

    /// Bind values for the 31-column parameterized INSERT, in column order.
    pub fn params(&self) -> [&dyn ToSql; 31] {
        [
            &self.document_process,
            &DOCUMENT_ACTIVITY,
            &self.document_type,
            &self.document_format,
            &self.document_path,
            &Null,
            &self.transaction_reference_id,
            &DOCUMENT_STATUS,
            &self.mime_type,
            &Null,
            &self.user_attr1,
            &self.user_attr2,
            &Null,
            &Null,
            &Null,
            &Null,
            &Null,
            &Null,
            &Null,
            &Null,
            &Null,
            &Null,
            &Null,
            &Null,
            &false,
            &self.timestamp,
            &SYSTEM_ACTOR,
            &self.timestamp,
            &SYSTEM_ACTOR,
            &self.page_count,
            &self.client_id,
        ]
    }
}

pub fn insert_statement(values: &[String]) -> String {
    format!(
        "INSERT INTO aif_document_details(\n{INSERT_COLUMNS}\n) VALUES {};\n",
        values.join(", ")
    )
}

pub fn parameterized_insert() -> String {
    let placeholders: Vec<String> = (1..=31).map(|index| format!("?{index}")).collect();
    format!(
        "INSERT INTO aif_document_details(\n{INSERT_COLUMNS}\n) VALUES ({})",
        placeholders.join(", ")
    )
}

pub fn storage_path(class: TransactionClass, fund: &str, txn_number: &str, extension: &str) -> String {
    let stem = document_stem(class, fund, txn_number);
    format!(
        "{STORAGE_PREFIX}/{}/{stem}/{stem}{extension}",
        fund_folder_name(fund)
    )
}

/// MIME type for a bare, lower-cased extension.
pub fn mime_type_for(extension: &str) -> &'static str {
    match extension {
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Concatenated character codes of the digits of `fund` ("150" encodes as
/// 495348). `None` when there are no digits or the result overflows.
pub fn encode_fund_code(fund: &str) -> Option<i64> {
    let encoded: String = fund
        .chars()
        .filter(char::is_ascii_digit)
        .map(|digit| u32::from(digit).to_string())
        .collect();
    encoded.parse().ok()
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
