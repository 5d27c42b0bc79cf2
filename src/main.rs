mod classify;
mod cli;
mod commands;
mod config;
mod errors;
mod model;
mod pages;
mod paths;
mod processed;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::WorkLayout;

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => commands::process::run(args),
        Commands::Split(args) => commands::split::run(args),
        Commands::GenerateSql(args) => commands::register::run_generate(args),
        Commands::ExecuteSql(args) => {
            let layout = WorkLayout::new(&args.workspace.work_root);
            let store = commands::open_store(&layout, &args.store)?;
            commands::register::run_execute(args, &store.pool)
        }
        Commands::ReconcileFolios(args) => {
            let layout = WorkLayout::new(&args.workspace.work_root);
            let store = commands::open_store(&layout, &args.store)?;
            commands::reconcile::run_folios(args, &store.pool)
        }
        Commands::Dedupe(args) => {
            let layout = WorkLayout::new(&args.workspace.work_root);
            let store = commands::open_store(&layout, &args.store)?;
            commands::reconcile::run_dedupe(args, &store.pool)
        }
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
