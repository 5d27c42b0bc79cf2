use anyhow::Result;

use super::execute::execute;
use super::generate::generate;
use crate::cli::{ExecuteArgs, GenerateArgs};
use crate::commands::emit_report;
use crate::config::WorkLayout;
use crate::model::RunId;
use crate::store::StorePool;

pub fn run_generate(args: GenerateArgs) -> Result<()> {
    let layout = WorkLayout::new(&args.workspace.work_root);
    let run_id = args.run_id.map(RunId::new);
    let result = generate(&layout, run_id.as_ref());
    emit_report(&layout, "generate_sql", &result)
}

pub fn run_execute(args: ExecuteArgs, pool: &StorePool) -> Result<()> {
    let layout = WorkLayout::new(&args.workspace.work_root);
    let run_id = args.run_id.map(RunId::new);
    let report = execute(pool, &layout, run_id.as_ref());
    emit_report(&layout, "execute_sql", &report)
}
