//! Default mode: produce a new backup artifact, recording version ledger
//! entries when versioning is enabled.

use std::ffi::OsStr;
use std::fs::File;
use std::process::ExitCode;

use chrono::Utc;
use miette::{IntoDiagnostic, Result};
use pgbak::config::Config;
use pgbak::process::{Input, Output};
use pgbak::store::{Sidecar, Store};
use pgbak::strategy::{self, Requested, State};
use pgbak::target::{Target, TargetId};
use pgbak::version::{Increment, Ledger};

use crate::args::{BackupArgs, BackupType, VersionArgs};
use crate::runner::{self, EXIT_GENERIC_FAILURE, EXIT_SUCCESS, EXIT_TIMEOUT};

pub fn invoke(
    backup_args: BackupArgs,
    version_args: VersionArgs,
    target_handler: &dyn Target,
    target: &TargetId,
    config: &Config,
) -> Result<ExitCode> {
    let store = Store::new(&backup_args.dir);
    let _lock = runner::try_lock(&store)?;

    let requested = if backup_args.force_full {
        Requested::Full
    } else {
        match backup_args.backup_type {
            BackupType::Auto => Requested::Auto,
            BackupType::Full => Requested::Full,
            BackupType::Incremental => Requested::Incremental,
        }
    };

    let mut state = State::load(&store.state_path());
    let newest_sidecar_mtime = store
        .list()
        .into_diagnostic()?
        .into_iter()
        .filter_map(|artifact| artifact.sidecar.is_some().then_some(artifact.mtime))
        .max();
    state.reconcile_if_stale(&store.state_path(), newest_sidecar_mtime);

    let now = Utc::now();
    let decision = strategy::decide(&state, requested, now);
    if let Some(reason) = decision.upgraded_reason {
        if !backup_args.quiet {
            log::info!("Upgrading to a full backup: {reason}");
        }
    }

    let requested_name = backup_args
        .name
        .clone()
        .unwrap_or_else(|| format!("{}-{}", decision.kind_str(), now.format("%Y%m%d_%H%M%S")));
    let resolved = store.resolve(&requested_name, backup_args.force).into_diagnostic()?;
    if let Some(original) = &resolved.renamed_from {
        if !backup_args.quiet {
            log::info!("{original:?} already exists; writing to {:?} instead", resolved.name);
        }
    }

    let dump_args = strategy::pg_dump_args(decision.kind, &config.postgres_user, &config.postgres_db);
    let mut argv: Vec<&OsStr> = vec![OsStr::new("pg_dump")];
    argv.extend(dump_args.iter().map(std::ffi::OsString::as_os_str));
    let env = [("PGPASSWORD", config.postgres_password.as_str())];

    if backup_args.verbose {
        let parts: Vec<String> = argv.iter().map(|part| part.to_string_lossy().into_owned()).collect();
        log::debug!("running: {}", pgbak::config::redact_command_line(&parts));
    }

    let payload_file = File::create(&resolved.path).into_diagnostic()?;
    let spinner = (!backup_args.quiet).then(|| {
        let bar = indicatif::ProgressBar::new_spinner();
        bar.set_style(
            indicatif::ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                .expect("invalid progress bar template"),
        );
        bar.set_message(format!("pg_dump against {}", target_handler.identity(target)));
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        bar
    });
    let exec_result = target_handler.exec(
        target,
        &argv,
        &env,
        Input::None,
        Output::File(payload_file),
        strategy::DUMP_TIMEOUT,
    );
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }
    let exit_code = match exec_result {
        Ok(code) => code,
        Err(pgbak::target::TargetError::ExecTimeout) => {
            let _ = std::fs::remove_file(&resolved.path);
            return Ok(runner::exit_code(EXIT_TIMEOUT));
        }
        Err(err) => {
            let _ = std::fs::remove_file(&resolved.path);
            return Err(err).into_diagnostic();
        }
    };
    if exit_code != 0 {
        let _ = std::fs::remove_file(&resolved.path);
        log::error!("pg_dump exited with code {exit_code}");
        return Ok(runner::exit_code(EXIT_GENERIC_FAILURE));
    }

    // Payload must be durable before the sidecar is written, so a crash
    // between the two never leaves a sidecar describing an unsynced payload.
    File::open(&resolved.path).into_diagnostic()?.sync_all().into_diagnostic()?;

    let byte_size = std::fs::metadata(&resolved.path).into_diagnostic()?.len();

    let (version_string, parent) = if version_args.enable_versioning {
        let increment: Increment = version_args.version_increment.into();
        let mut ledger = Ledger::load(store.versions_dir());
        let parent = ledger.find_latest_on_branch(&version_args.branch).map(str::to_owned);
        let version = match version_args.version.clone() {
            Some(explicit) => {
                ledger.record_explicit_version(
                    &version_args.branch,
                    explicit.clone(),
                    resolved.name.clone(),
                    now,
                    version_args.tags.clone(),
                    version_args.description.clone(),
                    parent.clone(),
                );
                explicit
            }
            None => ledger.record_version(
                &version_args.branch,
                increment,
                resolved.name.clone(),
                now,
                version_args.tags.clone(),
                version_args.description.clone(),
                parent.clone(),
            ),
        };
        ledger.save().into_diagnostic()?;
        (Some(version), parent)
    } else {
        (None, None)
    };

    let sidecar = Sidecar {
        kind: decision.kind,
        created_at: now,
        target_identity: target_handler.identity(target),
        byte_size,
        tags: version_args.tags.clone(),
        version: version_string,
        branch: version_args.enable_versioning.then(|| version_args.branch.clone()),
        description: version_args.description.clone(),
        parent_version: parent,
        extra: serde_json::Map::new(),
    };
    store.write_sidecar(&resolved.name, &sidecar).into_diagnostic()?;

    state.record(resolved.name.clone(), decision.kind, now, byte_size);
    state.save(&store.state_path()).into_diagnostic()?;

    if !backup_args.quiet {
        println!(
            "Backup {} ({:?}, {byte_size} bytes) written to {}",
            resolved.name,
            decision.kind,
            resolved.path.display()
        );
    }

    Ok(runner::exit_code(EXIT_SUCCESS))
}
