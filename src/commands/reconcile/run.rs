use anyhow::Result;
use tracing::warn;

use super::duplicates::{DedupeOptions, reconcile_duplicates};
use super::folio::reconcile_folios;
use crate::cli::{DedupeArgs, ReconcileFoliosArgs};
use crate::commands::emit_report;
use crate::commands::register::fund_codes;
use crate::config::WorkLayout;
use crate::errors::IntakeError;
use crate::model::RunId;
use crate::store::StorePool;
use crate::util::parse_cutoff;

pub fn run_folios(args: ReconcileFoliosArgs, pool: &StorePool) -> Result<()> {
    let layout = WorkLayout::new(&args.workspace.work_root);
    let run_id = args.run_id.map(RunId::new);

    let funds = match layout.processed_csv(run_id.as_ref()) {
        Ok(path) => fund_codes(&path)?,
        Err(err) if err.downcast_ref::<IntakeError>().is_some() && run_id.is_none() => {
            warn!(error = %format!("{err:#}"), "no processed csv, reconciling without fund codes");
            Vec::new()
        }
        Err(err) => return Err(err),
    };

    let report = reconcile_folios(pool, &funds);
    emit_report(&layout, "reconcile_folios", &report)
}

pub fn run_dedupe(args: DedupeArgs, pool: &StorePool) -> Result<()> {
    let layout = WorkLayout::new(&args.workspace.work_root);
    let options = DedupeOptions {
        cutoff: parse_cutoff(&args.cutoff)?,
        dry_run: args.dry_run || !args.apply,
        normalize: args.normalize,
    };

    let report = reconcile_duplicates(pool, options);
    emit_report(&layout, "dedupe", &report)
}
