mod duplicates;
mod folio;
mod run;
#[cfg(test)]
mod tests;

pub use duplicates::{DEFAULT_CUTOFF, DedupeOptions, DuplicateReport, PreviewRow, reconcile_duplicates};
pub use folio::reconcile_folios;
pub use run::{run_dedupe, run_folios};
