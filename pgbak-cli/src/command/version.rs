//! Versioning mode: the `--list-versions`/`--version-info`/
//! `--compare-versions`/`--list-branches`/`--create-tag`/`--list-tags`/
//! `--rollback-to`/`--rollback-history`/`--cleanup-versions` family.

use std::ffi::OsStr;
use std::fs::File;
use std::process::ExitCode;

use chrono::Utc;
use miette::{miette, IntoDiagnostic, Result};
use pgbak::config::Config;
use pgbak::process::{Input, Output};
use pgbak::restore;
use pgbak::store::{Sidecar, Store};
use pgbak::strategy;
use pgbak::target::{Target, TargetId};
use pgbak::version::Ledger;

use crate::args::VersionArgs;
use crate::runner::{self, EXIT_SUCCESS, EXIT_VALIDATION_FAILURE};

/// `target` is only required for `--rollback-to`, which must run the
/// strategy and restore pipelines against a live target; every other
/// versioning action only touches the ledgers on disk.
pub fn invoke(
    version_args: VersionArgs,
    store: &Store,
    target: Option<(&dyn Target, &TargetId)>,
    config: &Config,
) -> Result<ExitCode> {
    if version_args.list_versions {
        return list_versions(&version_args, store);
    }
    if let Some(version) = &version_args.version_info {
        return version_info(store, version);
    }
    if version_args.compare_versions.len() == 2 {
        return compare_versions(store, &version_args.compare_versions[0], &version_args.compare_versions[1]);
    }
    if version_args.list_branches {
        return list_branches(store);
    }
    if version_args.create_tag.len() == 2 {
        return create_tag(store, &version_args.create_tag[0], &version_args.create_tag[1]);
    }
    if version_args.list_tags {
        return list_tags(store);
    }
    if let Some(version) = &version_args.rollback_to {
        let (target_handler, target) = target.ok_or_else(|| miette!("rollback requires a resolved target"))?;
        return rollback_to(store, version, target_handler, target, config);
    }
    if version_args.rollback_history {
        return rollback_history(store);
    }
    if let Some(keep) = version_args.cleanup_versions {
        return cleanup_versions(store, keep, version_args.cleanup_dry_run);
    }

    Err(miette!("no versioning action given"))
}

fn list_versions(args: &VersionArgs, store: &Store) -> Result<ExitCode> {
    let ledger = Ledger::load(store.versions_dir());
    let mut entries: Vec<_> = ledger
        .state
        .entries
        .iter()
        .filter(|entry| args.filter_branch.as_deref().map_or(true, |branch| entry.branch == branch))
        .filter(|entry| {
            args.filter_tag
                .as_deref()
                .map_or(true, |tag| entry.tags.iter().any(|t| t == tag))
        })
        .collect();
    entries.sort_by_key(|entry| std::cmp::Reverse(entry.created_at));
    if let Some(limit) = args.limit {
        entries.truncate(limit);
    }
    for entry in entries {
        println!("{}  {}  branch={}  tags={:?}", entry.version_string, entry.created_at.to_rfc3339(), entry.branch, entry.tags);
    }
    Ok(runner::exit_code(EXIT_SUCCESS))
}

fn version_info(store: &Store, version: &str) -> Result<ExitCode> {
    let ledger = Ledger::load(store.versions_dir());
    match ledger.find(version) {
        Some(entry) => {
            println!("{entry:#?}");
            Ok(runner::exit_code(EXIT_SUCCESS))
        }
        None => {
            println!("No such version: {version}");
            Ok(runner::exit_code(EXIT_VALIDATION_FAILURE))
        }
    }
}

fn compare_versions(store: &Store, v1: &str, v2: &str) -> Result<ExitCode> {
    let ledger = Ledger::load(store.versions_dir());
    let (a, b) = (ledger.find(v1), ledger.find(v2));
    match (a, b) {
        (Some(a), Some(b)) => {
            println!("{v1}: artifact={} branch={} created_at={}", a.artifact_name, a.branch, a.created_at.to_rfc3339());
            println!("{v2}: artifact={} branch={} created_at={}", b.artifact_name, b.branch, b.created_at.to_rfc3339());
            println!("created_at delta: {}s", (b.created_at - a.created_at).num_seconds());
            Ok(runner::exit_code(EXIT_SUCCESS))
        }
        _ => {
            println!("One or both versions not found");
            Ok(runner::exit_code(EXIT_VALIDATION_FAILURE))
        }
    }
}

fn list_branches(store: &Store) -> Result<ExitCode> {
    let ledger = Ledger::load(store.versions_dir());
    for (name, info) in &ledger.branches.0 {
        println!(
            "{name}  backups={}  latest={}",
            info.backup_count,
            info.latest_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_owned()),
        );
    }
    Ok(runner::exit_code(EXIT_SUCCESS))
}

fn create_tag(store: &Store, version: &str, tag_name: &str) -> Result<ExitCode> {
    let mut ledger = Ledger::load(store.versions_dir());
    if ledger.find(version).is_none() {
        println!("No such version: {version}");
        return Ok(runner::exit_code(EXIT_VALIDATION_FAILURE));
    }
    ledger.tags.0.entry(tag_name.to_owned()).or_default().insert(version.to_owned());
    ledger.save().into_diagnostic()?;
    println!("Tagged {version} as {tag_name}");
    Ok(runner::exit_code(EXIT_SUCCESS))
}

fn list_tags(store: &Store) -> Result<ExitCode> {
    let ledger = Ledger::load(store.versions_dir());
    for (tag, versions) in &ledger.tags.0 {
        println!("{tag}: {versions:?}");
    }
    Ok(runner::exit_code(EXIT_SUCCESS))
}

fn rollback_history(store: &Store) -> Result<ExitCode> {
    let ledger = Ledger::load(store.versions_dir());
    for entry in &ledger.rollback_history.0 {
        println!(
            "{}  target={}  safety={}",
            entry.timestamp.to_rfc3339(),
            entry.target_version,
            entry.safety_backup_name,
        );
    }
    Ok(runner::exit_code(EXIT_SUCCESS))
}

fn cleanup_versions(store: &Store, keep_per_branch: usize, dry_run: bool) -> Result<ExitCode> {
    let mut ledger = Ledger::load(store.versions_dir());
    let to_delete = ledger.cleanup_plan(keep_per_branch);
    if to_delete.is_empty() {
        println!("Nothing to clean up.");
        return Ok(runner::exit_code(EXIT_SUCCESS));
    }
    println!("Would remove {} versions:", to_delete.len());
    for version in &to_delete {
        println!("  - {version}");
    }
    if dry_run {
        return Ok(runner::exit_code(EXIT_SUCCESS));
    }
    let removed: Vec<String> = to_delete;
    for version in &removed {
        if let Some(entry) = ledger.find(version) {
            let _ = std::fs::remove_file(store.payload_path(&entry.artifact_name));
            let _ = std::fs::remove_file(store.sidecar_path(&entry.artifact_name));
        }
    }
    ledger.state.entries.retain(|entry| !removed.contains(&entry.version_string));
    ledger.save().into_diagnostic()?;
    println!("Removed {} versions.", removed.len());
    Ok(runner::exit_code(EXIT_SUCCESS))
}

/// Roll back to `version`: take a safety backup tagged `safety` on branch
/// `rollback`, then restore the named version's artifact.
fn rollback_to(
    store: &Store,
    version: &str,
    target_handler: &dyn Target,
    target: &TargetId,
    config: &Config,
) -> Result<ExitCode> {
    let mut ledger = Ledger::load(store.versions_dir());
    let Some(entry) = ledger.find(version).cloned() else {
        println!("No such version: {version}");
        return Ok(runner::exit_code(EXIT_VALIDATION_FAILURE));
    };

    let now = Utc::now();
    let safety_name = format!("safety-{}", now.format("%Y%m%d_%H%M%S"));
    let resolved = store.resolve(&safety_name, false).into_diagnostic()?;
    let dump_args = strategy::pg_dump_args(pgbak::store::Kind::Full, &config.postgres_user, &config.postgres_db);
    let mut argv: Vec<&OsStr> = vec![OsStr::new("pg_dump")];
    argv.extend(dump_args.iter().map(std::ffi::OsString::as_os_str));
    let env = [("PGPASSWORD", config.postgres_password.as_str())];
    let payload_file = File::create(&resolved.path).into_diagnostic()?;
    let exit_code = target_handler
        .exec(target, &argv, &env, Input::None, Output::File(payload_file), strategy::DUMP_TIMEOUT)
        .into_diagnostic()?;
    if exit_code != 0 {
        let _ = std::fs::remove_file(&resolved.path);
        return Err(miette!("safety backup before rollback failed (pg_dump exited {exit_code})"));
    }
    let byte_size = std::fs::metadata(&resolved.path).into_diagnostic()?.len();
    store
        .write_sidecar(
            &resolved.name,
            &Sidecar {
                kind: pgbak::store::Kind::Full,
                created_at: now,
                target_identity: target_handler.identity(target),
                byte_size,
                tags: vec!["safety".to_owned()],
                version: None,
                branch: Some("rollback".to_owned()),
                description: Some(format!("pre-rollback safety backup before restoring {version}")),
                parent_version: None,
                extra: serde_json::Map::new(),
            },
        )
        .into_diagnostic()?;

    let (artifact, _summary) = restore::prepare(store, &entry.artifact_name).into_diagnostic()?;
    restore::execute(
        target_handler,
        target,
        &artifact,
        &config.postgres_user,
        &config.postgres_db,
        &config.postgres_password,
    )
    .into_diagnostic()?;

    ledger.record_rollback(now, version.to_owned(), resolved.name.clone());
    ledger.save().into_diagnostic()?;

    println!("Rolled back to {version}; safety backup saved as {}", resolved.name);
    Ok(runner::exit_code(EXIT_SUCCESS))
}
