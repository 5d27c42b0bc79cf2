//! Transaction-type classification.
//!
//! Raw manifest mnemonics map onto a small set of transaction classes, and each
//! class has a human-readable document-type label. Both lookups are total:
//! anything unmapped is the literal `"Unknown"`.

use std::fmt;

use serde::Serialize;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionClass {
    InitialContribution,
    NonCommercial,
    Redemption,
    Ipo,
    Sip,
    Swp,
    /// Batch documents are filed under `_BATCH_NUMBER_` folders. No raw
    /// mnemonic maps here; the class only arrives as a stored code.
    Batch,
    Unknown,
}

impl TransactionClass {
    const KNOWN: [TransactionClass; 7] = [
        Self::InitialContribution,
        Self::NonCommercial,
        Self::Redemption,
        Self::Ipo,
        Self::Sip,
        Self::Swp,
        Self::Batch,
    ];

    /// Classifies a raw manifest mnemonic. Case-sensitive.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "NEW" => Self::InitialContribution,
            "NCT" => Self::NonCommercial,
            "RED" | "FUL" => Self::Redemption,
            "IPO" => Self::Ipo,
            "SIN" => Self::Sip,
            "SWOP" | "SWOF" => Self::Swp,
            _ => Self::Unknown,
        }
    }

    /// Parses an already-normalized class code, as stored in the processed CSV.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        Self::KNOWN
            .into_iter()
            .find(|class| class.code() == code)
            .unwrap_or(Self::Unknown)
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::InitialContribution => "IC",
            Self::NonCommercial => "NCT",
            Self::Redemption => "RED",
            Self::Ipo => "IOBI",
            Self::Sip => "IOBIS",
            Self::Swp => "SWP",
            Self::Batch => "DD",
            Self::Unknown => UNKNOWN,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::InitialContribution => "Initial Contribution Form",
            Self::NonCommercial => "Non Commercial Transactions Form",
            Self::Redemption => "Redemption Form",
            Self::Ipo => "IPO Form",
            Self::Sip => "SIP Form",
            Self::Swp => "SWP Form",
            Self::Batch | Self::Unknown => UNKNOWN,
        }
    }

    pub fn is_batch(self) -> bool {
        self == Self::Batch
    }
}

impl fmt::Display for TransactionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Raw mnemonic to class code.
pub fn classify(raw: &str) -> &'static str {
    TransactionClass::from_raw(raw).code()
}

/// Class code to document-type label.
pub fn label_for(class_code: &str) -> &'static str {
    TransactionClass::from_code(class_code).label()
}
