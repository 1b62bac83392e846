#![doc = include_str!("../README.md")]

mod args;
mod cli;
mod command;
mod runner;

use std::process::ExitCode;

use clap::Parser;
use miette::Result;
use pgbak::config::Config;
use pgbak::store::Store;

fn main() -> Result<ExitCode> {
    let cli = cli::Cli::parse();

    let log_level = if cli.backup.verbose {
        log::LevelFilter::Debug
    } else if cli.backup.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    simple_logger::init_with_level(log_level.to_level().unwrap_or(log::Level::Info))
        .expect("logger can only be initialized once");

    // Ignore SIGINT/SIGTERM in the parent; the running child receives the
    // signal too and we rely on the process runner's own kill-with-grace
    // path to clean up.
    ctrlc::set_handler(|| ()).expect("could not install signal handler");

    let config = Config::from_env();

    let version_action = cli.version.list_versions
        || cli.version.version_info.is_some()
        || cli.version.compare_versions.len() == 2
        || cli.version.list_branches
        || cli.version.create_tag.len() == 2
        || cli.version.list_tags
        || cli.version.rollback_to.is_some()
        || cli.version.rollback_history
        || cli.version.cleanup_versions.is_some();

    let retention_action = cli.retention.apply_retention || cli.retention.retention_dry_run;
    let restore_action = cli.restore.restore || cli.restore.restore_file.is_some();

    let store = Store::new(&cli.backup.dir);

    if version_action {
        if cli.version.rollback_to.is_some() {
            let (handler, target) = runner::resolve_target(&cli.target)?;
            return command::version::invoke(cli.version, &store, Some((handler.as_ref(), &target)), &config);
        }
        return command::version::invoke(cli.version, &store, None, &config);
    }

    if retention_action {
        return command::retention::invoke(cli.retention, &store);
    }

    if restore_action {
        let (handler, target) = runner::resolve_target(&cli.target)?;
        return command::restore::invoke(cli.restore, cli.backup, handler.as_ref(), &target, &config);
    }

    if cli.list.list || cli.list.backup_summary {
        return command::list::invoke(cli.list, cli.retention, &store);
    }

    let (handler, target) = runner::resolve_target(&cli.target)?;
    command::backup::invoke(cli.backup, cli.version, handler.as_ref(), &target, &config)
}
