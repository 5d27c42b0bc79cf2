mod pipeline;
mod run;
mod sheet;

pub use pipeline::{CopiedFile, ManifestRow, ProcessingSummary};
pub use run::{ProcessingResult, process, process_sheets, run, write_processed_csv};
pub use sheet::{REQUIRED_HEADERS, Worksheet};
