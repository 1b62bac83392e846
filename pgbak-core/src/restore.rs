//! Core restore mechanics: validation reuse, summary data, execution and
//! post-restore verification.
//!
//! Interactive artifact selection and the confirmation prompt are a
//! terminal concern and live in the binary; this module only does the
//! parts that touch the target and the filesystem.

use std::fs::File;
use std::time::Duration;

use crate::process::{Input, Output};
use crate::store::{ArtifactInfo, Store, StoreError};
use crate::target::{Target, TargetError, TargetId};

pub const RESTORE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum RestoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error("restore was cancelled")]
    Cancelled,
    #[error("restore exec failed: {0}")]
    ExecFailed(String),
    #[error("post-restore verification failed")]
    VerifyFailed,
}

/// Everything needed to render a human-facing confirmation prompt before
/// executing a restore. Built from a [`crate::store::Sidecar`].
#[derive(Clone, Debug)]
pub struct Summary {
    pub name: String,
    pub byte_size: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub target_identity: String,
    pub kind: crate::store::Kind,
}

impl Summary {
    #[must_use]
    pub fn from_artifact(artifact: &ArtifactInfo) -> Option<Self> {
        let sidecar = artifact.sidecar.as_ref()?;
        Some(Self {
            name: artifact.name.clone(),
            byte_size: sidecar.byte_size,
            created_at: sidecar.created_at,
            target_identity: sidecar.target_identity.clone(),
            kind: sidecar.kind,
        })
    }
}

/// Validate the artifact and build its [`Summary`]. Returns `Err` with a
/// clear reason on an invalid artifact.
pub fn prepare(store: &Store, name: &str) -> Result<(ArtifactInfo, Summary), RestoreError> {
    store.validate(name)?;
    let artifacts = store.list()?;
    let artifact = artifacts
        .into_iter()
        .find(|artifact| artifact.name == name)
        .ok_or_else(|| StoreError::NotFound(name.to_owned()))?;
    let summary = Summary::from_artifact(&artifact)
        .ok_or_else(|| StoreError::Invalid(name.to_owned(), "missing sidecar metadata".to_owned()))?;
    Ok((artifact, summary))
}

/// Execute the restore: stream the payload into `psql --single-transaction`
/// running inside `target`.
pub fn execute(
    target_handler: &dyn Target,
    target: &TargetId,
    artifact: &ArtifactInfo,
    user: &str,
    db: &str,
    password: &str,
) -> Result<(), RestoreError> {
    let payload = File::open(&artifact.path).map_err(crate::target::TargetError::from)?;
    let argv: Vec<&std::ffi::OsStr> = vec![
        "psql".as_ref(),
        "--username".as_ref(),
        std::ffi::OsStr::new(user),
        "--dbname".as_ref(),
        std::ffi::OsStr::new(db),
        "--single-transaction".as_ref(),
    ];
    let env = [("PGPASSWORD", password)];
    let exit_code = target_handler.exec(
        target,
        &argv,
        &env,
        Input::File(payload),
        Output::Captured,
        RESTORE_TIMEOUT,
    )?;
    if exit_code != 0 {
        return Err(RestoreError::ExecFailed(format!("psql exited with code {exit_code}")));
    }
    Ok(())
}

/// Probe the database with a cheap `SELECT 1`. A verify failure is reported
/// but never triggers an automatic re-rollback — the caller decides what to
/// do next.
pub fn verify(
    target_handler: &dyn Target,
    target: &TargetId,
    user: &str,
    db: &str,
    password: &str,
) -> Result<(), RestoreError> {
    let argv: Vec<&std::ffi::OsStr> = vec![
        "psql".as_ref(),
        "--username".as_ref(),
        std::ffi::OsStr::new(user),
        "--dbname".as_ref(),
        std::ffi::OsStr::new(db),
        "-c".as_ref(),
        "SELECT 1".as_ref(),
    ];
    let env = [("PGPASSWORD", password)];
    let exit_code = target_handler
        .exec(target, &argv, &env, Input::None, Output::Captured, VERIFY_TIMEOUT)
        .map_err(|_| RestoreError::VerifyFailed)?;
    if exit_code == 0 {
        Ok(())
    } else {
        Err(RestoreError::VerifyFailed)
    }
}

/// Accepted confirmation strings, case-insensitive.
#[must_use]
pub fn is_affirmative(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// 1-based numbered selection from a newest-first listing, with `0`
/// meaning cancel.
#[must_use]
pub fn select_by_number(artifacts: &[ArtifactInfo], choice: usize) -> Option<&ArtifactInfo> {
    if choice == 0 {
        return None;
    }
    artifacts.get(choice - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_affirmative_accepts_y_and_yes_case_insensitively() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative("YES"));
        assert!(is_affirmative(" Yes \n"));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn select_by_number_zero_is_cancel() {
        let artifacts: Vec<ArtifactInfo> = Vec::new();
        assert!(select_by_number(&artifacts, 0).is_none());
    }

    #[test]
    fn select_by_number_is_one_indexed() {
        let artifacts = vec![ArtifactInfo {
            name: "only".to_owned(),
            path: std::path::PathBuf::from("only.sql"),
            mtime: std::time::SystemTime::now(),
            sidecar: None,
        }];
        assert_eq!(select_by_number(&artifacts, 1).unwrap().name, "only");
        assert!(select_by_number(&artifacts, 2).is_none());
    }
}
