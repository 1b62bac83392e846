//! Glue: resolve a target handler from CLI args, take the coordinating
//! lock, and map internal errors onto process exit codes.

use std::process::ExitCode;

use either::{Left, Right};
use miette::Result;
use pgbak::detect::{self, Backend, DetectInputs, Override};
use pgbak::lock::{LockedFileExclusive, UnlockedFile};
use pgbak::store::Store;
use pgbak::target::cluster::ClusterTarget;
use pgbak::target::container::ContainerTarget;
use pgbak::target::{Target, TargetId};

use crate::args;

/// Process exit codes.
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_GENERIC_FAILURE: u8 = 1;
pub const EXIT_TARGET_UNAVAILABLE: u8 = 2;
pub const EXIT_VALIDATION_FAILURE: u8 = 3;
pub const EXIT_USER_CANCEL: u8 = 4;
pub const EXIT_BUSY: u8 = 5;
pub const EXIT_TIMEOUT: u8 = 6;

#[must_use]
pub fn exit_code(code: u8) -> ExitCode {
    ExitCode::from(code)
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum RunnerError {
    #[error("could not determine whether a container engine or cluster is available")]
    #[diagnostic(help("pass --force-docker or --force-kubernetes to bypass detection"))]
    NoBackendDetected,
    #[error(transparent)]
    Target(#[from] pgbak::target::TargetError),
    #[error("input/output error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("could not take the coordinating lock: {0}")]
    LockError(#[from] nix::Error),
    #[error("another invocation is already running against this backup directory")]
    BusyElsewhere,
}

/// Resolve a target handler and candidate target from the CLI's target
/// selection flags, running detection unless overridden.
pub fn resolve_target(args: &args::TargetArgs) -> Result<(Box<dyn Target>, TargetId), RunnerError> {
    let override_flag = if args.force_docker {
        Some(Override::ForceContainer)
    } else if args.force_kubernetes {
        Some(Override::ForceCluster)
    } else {
        None
    };

    let backend = if let Some(pod) = &args.pod {
        let _ = pod; // pod name alone implies cluster backend
        Backend::Cluster
    } else if let Some(container) = &args.container {
        let _ = container;
        Backend::Container
    } else {
        detect::detect(&DetectInputs::gather(override_flag)).ok_or(RunnerError::NoBackendDetected)?
    };

    let handler: Box<dyn Target> = match backend {
        Backend::Container => Box::new(ContainerTarget::new(args.container.clone())),
        Backend::Cluster => Box::new(ClusterTarget::with_label_selector(
            args.pod.clone(),
            Some(args.namespace.clone()),
            args.k8s_container.clone(),
            args.labels.clone(),
        )),
    };
    let target = handler.discover()?;
    Ok((handler, target))
}

/// Take the exclusive advisory lock on `<backup_dir>/.metadata/.lock`
/// without blocking. A second invocation finding it held reports
/// `BusyElsewhere` (exit code 5).
pub fn try_lock(store: &Store) -> Result<LockedFileExclusive, RunnerError> {
    store.ensure_dirs()?;
    let unlocked = UnlockedFile::try_from(&store.lock_path())?;
    match unlocked.try_lock_exclusive()? {
        Right(locked) => Ok(locked),
        Left(_) => Err(RunnerError::BusyElsewhere),
    }
}
