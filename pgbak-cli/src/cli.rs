use clap::Parser;

use crate::args;

/// Back up and restore a PostgreSQL database running in a container or a
/// cluster pod.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub target: args::TargetArgs,

    #[clap(flatten)]
    pub backup: args::BackupArgs,

    #[clap(flatten)]
    pub list: args::ListArgs,

    #[clap(flatten)]
    pub restore: args::RestoreArgs,

    #[clap(flatten)]
    pub retention: args::RetentionArgs,

    #[clap(flatten)]
    pub version: args::VersionArgs,
}
