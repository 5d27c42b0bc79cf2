mod execute;
mod generate;
mod parse;
mod record;
mod run;

pub use execute::execute;
pub use generate::{GenerateResult, fund_codes, generate};
pub use run::{run_execute, run_generate};
