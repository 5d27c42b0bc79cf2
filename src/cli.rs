use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::commands::reconcile::DEFAULT_CUTOFF;
use crate::config::WorkLayout;
use crate::store::StoreSettings;

#[derive(Parser, Debug)]
#[command(
    name = "scan-intake",
    version,
    about = "Scanned-document intake: copy, split, register and reconcile"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy documents named by a manifest workbook into the canonical tree.
    Process(ProcessArgs),
    /// Split copied documents into single-page files.
    Split(SplitArgs),
    /// Render registration INSERT statements for a run.
    GenerateSql(GenerateArgs),
    /// Insert a run's registration rows in one transaction.
    ExecuteSql(ExecuteArgs),
    ReconcileFolios(ReconcileFoliosArgs),
    /// Remove duplicate registrations around a cutoff (dry run by default).
    Dedupe(DedupeArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WorkspaceArgs {
    #[arg(long, default_value = ".")]
    pub work_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = 20)]
    pub max_connections: usize,

    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    #[arg(long, default_value_t = 30)]
    pub idle_timeout_secs: u64,

    #[arg(long, default_value_t = 300)]
    pub health_check_secs: u64,
}

impl StoreArgs {
    pub fn settings(&self, layout: &WorkLayout) -> StoreSettings {
        StoreSettings {
            db_path: self
                .db_path
                .clone()
                .unwrap_or_else(|| layout.default_db_path()),
            max_connections: self.max_connections.max(1),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            health_check_interval: Duration::from_secs(self.health_check_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    /// Manifest workbook (.xlsx) with one worksheet.
    #[arg(long)]
    pub manifest: PathBuf,

    #[arg(long, default_value_t = false)]
    pub keep_manifest: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long, default_value_t = 100)]
    pub concurrency: usize,

    #[arg(long, default_value = "python3")]
    pub fallback_program: String,

    #[arg(long, default_value = "fallback_split.py")]
    pub fallback_script: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub run_id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExecuteArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub run_id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileFoliosArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub run_id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DedupeArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value = DEFAULT_CUTOFF)]
    pub cutoff: String,

    /// Preview only. This is the default unless `--apply` is given.
    #[arg(long, default_value_t = false, conflicts_with = "apply")]
    pub dry_run: bool,

    /// Delete rows instead of previewing them.
    #[arg(long, default_value_t = false)]
    pub apply: bool,

    #[arg(long, default_value_t = false)]
    pub normalize: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_defaults_to_dry_run_with_source_cutoff() {
        let cli = Cli::try_parse_from(["scan-intake", "dedupe"]).expect("dedupe parses");
        let Commands::Dedupe(args) = cli.command else {
            panic!("expected dedupe command");
        };
        assert!(!args.apply);
        assert_eq!(args.cutoff, DEFAULT_CUTOFF);
        assert_eq!(args.workspace.work_root, PathBuf::from("."));
    }

    #[test]
    fn store_flags_build_settings_under_work_root() {
        let cli = Cli::try_parse_from([
            "scan-intake",
            "execute-sql",
            "--work-root",
            "/tmp/intake",
            "--max-connections",
            "4",
        ])
        .expect("execute-sql parses");
        let Commands::ExecuteSql(args) = cli.command else {
            panic!("expected execute-sql command");
        };
        let settings = args.store.settings(&WorkLayout::new(&args.workspace.work_root));
        assert_eq!(settings.db_path, PathBuf::from("/tmp/intake/scan_intake.sqlite"));
        assert_eq!(settings.max_connections, 4);
        assert_eq!(settings.health_check_interval, Duration::from_secs(300));
    }

    #[test]
    fn dry_run_conflicts_with_apply() {
        assert!(Cli::try_parse_from(["scan-intake", "dedupe", "--dry-run", "--apply"]).is_err());
    }
}
