//! Restore mode: interactive or `--restore-file` selection, confirmation,
//! execution and verification.

use std::io::{BufRead, Write};
use std::process::ExitCode;

use miette::{IntoDiagnostic, Result};
use pgbak::config::Config;
use pgbak::restore;
use pgbak::store::Store;
use pgbak::target::{Target, TargetId};

use crate::args::{BackupArgs, RestoreArgs};
use crate::runner::{self, EXIT_SUCCESS, EXIT_USER_CANCEL, EXIT_VALIDATION_FAILURE};

pub fn invoke(
    restore_args: RestoreArgs,
    backup_args: BackupArgs,
    target_handler: &dyn Target,
    target: &TargetId,
    config: &Config,
) -> Result<ExitCode> {
    let store = Store::new(&backup_args.dir);
    let term = console::Term::stdout();

    let name = match &restore_args.restore_file {
        Some(name) => name.clone(),
        None => match select_interactively(&store, &term)? {
            Some(name) => name,
            None => {
                term.write_line("Restore cancelled.").into_diagnostic()?;
                return Ok(runner::exit_code(EXIT_USER_CANCEL));
            }
        },
    };

    let (artifact, summary) = match restore::prepare(&store, &name) {
        Ok(result) => result,
        Err(err) => {
            term.write_line(&format!("Cannot restore {name:?}: {err}")).into_diagnostic()?;
            return Ok(runner::exit_code(EXIT_VALIDATION_FAILURE));
        }
    };

    term.write_line(&format!(
        "Artifact: {}\nSize: {} bytes\nCreated: {}\nTarget: {}\nKind: {:?}",
        summary.name,
        summary.byte_size,
        summary.created_at.to_rfc3339(),
        summary.target_identity,
        summary.kind,
    ))
    .into_diagnostic()?;

    let confirmed = if backup_args.quiet {
        restore_args.yes
    } else {
        term.write_str("Restore this artifact? [y/N] ").into_diagnostic()?;
        std::io::stdout().flush().into_diagnostic()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).into_diagnostic()?;
        restore::is_affirmative(&line)
    };
    if !confirmed {
        term.write_line("Restore cancelled.").into_diagnostic()?;
        return Ok(runner::exit_code(EXIT_USER_CANCEL));
    }

    let spinner = (!backup_args.quiet).then(|| {
        let bar = indicatif::ProgressBar::new_spinner();
        bar.set_draw_target(indicatif::ProgressDrawTarget::term(term.clone(), 20));
        bar.set_style(
            indicatif::ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                .expect("invalid progress bar template"),
        );
        bar.set_message(format!("restoring {} into {}", artifact.name, target_handler.identity(target)));
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        bar
    });
    let restore_result = restore::execute(
        target_handler,
        target,
        &artifact,
        &config.postgres_user,
        &config.postgres_db,
        &config.postgres_password,
    );
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }
    restore_result.into_diagnostic()?;

    match restore::verify(target_handler, target, &config.postgres_user, &config.postgres_db, &config.postgres_password) {
        Ok(()) => term.write_line("Restore complete and verified.").into_diagnostic()?,
        Err(_) => term
            .write_line("Restore completed but post-restore verification failed; inspect the target manually.")
            .into_diagnostic()?,
    }

    Ok(runner::exit_code(EXIT_SUCCESS))
}

fn select_interactively(store: &Store, term: &console::Term) -> Result<Option<String>> {
    let artifacts = store.list().into_diagnostic()?;
    if artifacts.is_empty() {
        term.write_line("No artifacts to restore.").into_diagnostic()?;
        return Ok(None);
    }
    for (index, artifact) in artifacts.iter().enumerate() {
        term.write_line(&format!("{}) {}", index + 1, artifact.name)).into_diagnostic()?;
    }
    term.write_str("Choose an artifact (0 to cancel): ").into_diagnostic()?;
    std::io::stdout().flush().into_diagnostic()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).into_diagnostic()?;
    let choice: usize = line.trim().parse().unwrap_or(0);
    Ok(restore::select_by_number(&artifacts, choice).map(|artifact| artifact.name.clone()))
}
