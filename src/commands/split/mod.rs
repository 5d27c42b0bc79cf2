mod fallback;
mod run;
#[cfg(test)]
mod tests;
mod verify;
mod walk;

pub use fallback::{ExternalSplitter, FallbackSplitter};
pub use run::{SplitResult, SplitSummary, run, split_all};
pub use verify::RowVerification;
pub use walk::{FileSplit, SplitFile, SplitOutcome};
