//! Listing mode: `--list` / `--backup-summary`.

use std::process::ExitCode;

use miette::{IntoDiagnostic, Result};
use pgbak::retention::{self, Limits};
use pgbak::store::Store;

use crate::args::{ListArgs, RetentionArgs};
use crate::runner::{self, EXIT_SUCCESS};

pub fn invoke(list_args: ListArgs, retention_args: RetentionArgs, store: &Store) -> Result<ExitCode> {
    let artifacts = store.list().into_diagnostic()?;
    if artifacts.is_empty() {
        println!("No artifacts in {}", store.backup_dir.display());
        return Ok(runner::exit_code(EXIT_SUCCESS));
    }

    for artifact in &artifacts {
        match &artifact.sidecar {
            Some(sidecar) => println!(
                "{:<40} {:?}  {}  {} bytes",
                artifact.name,
                sidecar.kind,
                sidecar.created_at.to_rfc3339(),
                sidecar.byte_size,
            ),
            None => println!("{:<40} (legacy, no sidecar)", artifact.name),
        }
    }

    if list_args.backup_summary {
        let limits = Limits {
            daily: retention_args.daily.unwrap_or_else(|| Limits::default().daily),
            weekly: retention_args.weekly.unwrap_or_else(|| Limits::default().weekly),
            monthly: retention_args.monthly.unwrap_or_else(|| Limits::default().monthly),
            full: retention_args.full.unwrap_or_else(|| Limits::default().full),
        };
        let plan = retention::plan(&artifacts, &limits);
        println!();
        println!("Retention summary: {} kept, {} would be pruned", plan.keep.len(), plan.delete.len());
    }

    Ok(runner::exit_code(EXIT_SUCCESS))
}
