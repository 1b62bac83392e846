//! Retention mode: `--retention-dry-run` / `--apply-retention`.

use std::process::ExitCode;

use miette::{IntoDiagnostic, Result};
use pgbak::retention::{self, Limits};
use pgbak::store::Store;

use crate::args::RetentionArgs;
use crate::runner::{self, EXIT_SUCCESS};

pub fn invoke(retention_args: RetentionArgs, store: &Store) -> Result<ExitCode> {
    let _lock = runner::try_lock(store)?;

    let defaults = Limits::default();
    let limits = Limits {
        daily: retention_args.daily.unwrap_or(defaults.daily),
        weekly: retention_args.weekly.unwrap_or(defaults.weekly),
        monthly: retention_args.monthly.unwrap_or(defaults.monthly),
        full: retention_args.full.unwrap_or(defaults.full),
    };

    let artifacts = store.list().into_diagnostic()?;
    let plan = retention::plan(&artifacts, &limits);

    if plan.delete.is_empty() {
        println!("Nothing to prune: {} artifacts, all within limits.", plan.keep.len());
        return Ok(runner::exit_code(EXIT_SUCCESS));
    }

    println!("Retention plan: keep {}, prune {}:", plan.keep.len(), plan.delete.len());
    for name in &plan.delete {
        println!("  - {name}");
    }

    if retention_args.retention_dry_run || !retention_args.apply_retention {
        return Ok(runner::exit_code(EXIT_SUCCESS));
    }

    for name in &plan.delete {
        let _ = std::fs::remove_file(store.payload_path(name));
        let _ = std::fs::remove_file(store.sidecar_path(name));
    }
    println!("Pruned {} artifacts.", plan.delete.len());

    Ok(runner::exit_code(EXIT_SUCCESS))
}
