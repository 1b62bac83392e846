//! Flattened `clap::Args` groups making up the single executable's option
//! surface.

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug, Default)]
#[clap(next_help_heading = Some("Target selection"))]
pub struct TargetArgs {
    /// Name of the container to back up/restore (container backend).
    #[clap(long, display_order = 1)]
    pub container: Option<String>,

    /// Name of the pod to back up/restore (cluster backend).
    #[clap(long, display_order = 2)]
    pub pod: Option<String>,

    /// Namespace the pod lives in.
    #[clap(long, default_value = "default", display_order = 3)]
    pub namespace: String,

    /// Label selector used to discover a pod, e.g. `app=postgres`.
    #[clap(long = "labels", value_name = "K=V[,K=V]", display_order = 4)]
    pub labels: Option<String>,

    /// Container name within the pod, if it has more than one.
    #[clap(long = "k8s-container", display_order = 5)]
    pub k8s_container: Option<String>,

    /// Force the container-engine backend, skipping detection.
    #[clap(long, conflicts_with = "force_kubernetes", display_order = 10)]
    pub force_docker: bool,

    /// Force the cluster backend, skipping detection.
    #[clap(long, conflicts_with = "force_docker", display_order = 11)]
    pub force_kubernetes: bool,

    /// Explicitly request detection even if an override would otherwise
    /// apply (documents intent; detection also runs by default).
    #[clap(long, display_order = 12)]
    pub auto_detect: bool,
}

#[derive(Args, Debug, Default)]
#[clap(next_help_heading = Some("Backup"))]
pub struct BackupArgs {
    /// Name for the new artifact (default: a timestamp-derived name).
    #[clap(long, display_order = 20)]
    pub name: Option<String>,

    /// Directory backups are read from and written to.
    #[clap(long = "dir", env = "BACKUP_DIR", default_value = "./backups", display_order = 21)]
    pub dir: PathBuf,

    /// Overwrite an existing artifact with the same name instead of
    /// renaming the new one.
    #[clap(long, display_order = 22)]
    pub force: bool,

    /// `auto` picks full vs incremental per the strategy engine.
    #[clap(long, value_enum, default_value = "auto", display_order = 23)]
    pub backup_type: BackupType,

    /// Shorthand for `--backup-type full`.
    #[clap(long, display_order = 24)]
    pub force_full: bool,

    /// Suppress non-essential output.
    #[clap(long, display_order = 90)]
    pub quiet: bool,

    /// Emit command lines run inside the target (credentials redacted).
    #[clap(long, display_order = 91)]
    pub verbose: bool,

    /// Disable colored/styled terminal output.
    #[clap(long, display_order = 92)]
    pub no_color: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BackupType {
    #[default]
    Auto,
    Full,
    Incremental,
}

#[derive(Args, Debug, Default)]
#[clap(next_help_heading = Some("Listing"))]
pub struct ListArgs {
    /// List artifacts in `--dir`, newest first.
    #[clap(long, display_order = 30)]
    pub list: bool,

    /// Include a per-bucket retention summary alongside the listing.
    #[clap(long, display_order = 31)]
    pub backup_summary: bool,
}

#[derive(Args, Debug, Default)]
#[clap(next_help_heading = Some("Restore"))]
pub struct RestoreArgs {
    /// Restore interactively: choose an artifact from a numbered list.
    #[clap(long, display_order = 40)]
    pub restore: bool,

    /// Restore a specific artifact by name, non-interactively.
    #[clap(long, value_name = "NAME", display_order = 41)]
    pub restore_file: Option<String>,

    /// Skip the confirmation prompt (only takes effect with `--quiet`).
    #[clap(long, display_order = 42)]
    pub yes: bool,
}

#[derive(Args, Debug, Default)]
#[clap(next_help_heading = Some("Retention"))]
pub struct RetentionArgs {
    #[clap(long = "retention-daily", display_order = 50)]
    pub daily: Option<usize>,
    #[clap(long = "retention-weekly", display_order = 51)]
    pub weekly: Option<usize>,
    #[clap(long = "retention-monthly", display_order = 52)]
    pub monthly: Option<usize>,
    #[clap(long = "retention-full", display_order = 53)]
    pub full: Option<usize>,

    /// Compute and print the deletion plan without deleting anything.
    #[clap(long, display_order = 54)]
    pub retention_dry_run: bool,

    /// Apply the retention plan, deleting artifacts beyond the configured
    /// limits.
    #[clap(long, display_order = 55)]
    pub apply_retention: bool,
}

#[derive(Args, Debug, Default)]
#[clap(next_help_heading = Some("Versioning"))]
pub struct VersionArgs {
    /// Record a semantic version for this backup.
    #[clap(long, display_order = 60)]
    pub enable_versioning: bool,

    /// Branch to version on.
    #[clap(long, default_value = "main", display_order = 61)]
    pub branch: String,

    /// Exact version string to record instead of computing the next one.
    #[clap(long, display_order = 62)]
    pub version: Option<String>,

    /// Which part of the version triple to bump.
    #[clap(long, value_enum, default_value = "patch", display_order = 63)]
    pub version_increment: VersionIncrementArg,

    #[clap(long = "tags", num_args = 0.., display_order = 64)]
    pub tags: Vec<String>,

    #[clap(long, display_order = 65)]
    pub description: Option<String>,

    #[clap(long, display_order = 70)]
    pub list_versions: bool,
    #[clap(long, display_order = 71)]
    pub filter_branch: Option<String>,
    #[clap(long, display_order = 72)]
    pub filter_tag: Option<String>,
    #[clap(long, display_order = 73)]
    pub limit: Option<usize>,

    #[clap(long, value_name = "VERSION", display_order = 74)]
    pub version_info: Option<String>,

    #[clap(long, num_args = 2, value_names = ["V1", "V2"], display_order = 75)]
    pub compare_versions: Vec<String>,

    #[clap(long, display_order = 76)]
    pub list_branches: bool,

    #[clap(long, num_args = 2, value_names = ["VERSION", "NAME"], display_order = 77)]
    pub create_tag: Vec<String>,

    #[clap(long, display_order = 78)]
    pub list_tags: bool,

    #[clap(long, value_name = "VERSION", display_order = 79)]
    pub rollback_to: Option<String>,

    #[clap(long, display_order = 80)]
    pub rollback_history: bool,

    #[clap(long, value_name = "N", display_order = 81)]
    pub cleanup_versions: Option<usize>,

    #[clap(long, display_order = 82)]
    pub cleanup_dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum VersionIncrementArg {
    Major,
    Minor,
    Patch,
}

impl From<VersionIncrementArg> for pgbak::version::Increment {
    fn from(value: VersionIncrementArg) -> Self {
        match value {
            VersionIncrementArg::Major => Self::Major,
            VersionIncrementArg::Minor => Self::Minor,
            VersionIncrementArg::Patch => Self::Patch,
        }
    }
}
