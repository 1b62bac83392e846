//! Uniform operations over the two backends a target can run in.
//!
//! Callers hold a `&dyn Target` (or are generic over `T: Target`) and never
//! branch on the concrete backend; that distinction is made once, in
//! [`crate::detect`], and baked into which implementor gets constructed.

pub mod cluster;
pub mod container;

use std::ffi::OsStr;
use std::fs::File;
use std::time::Duration;

use crate::process::{Input, Output, ProcessError};

/// A located, addressable instance of the backend (a container name, or a
/// pod name plus namespace and container).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetId(pub String);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    NotRunning,
    NotFound,
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum TargetError {
    #[error("no running target found")]
    TargetNotFound,
    #[error("target {0} is not running")]
    TargetNotRunning(TargetId),
    #[error("command in target timed out")]
    ExecTimeout,
    #[error("command in target exited {exit_code}: {stderr}")]
    ExecNonZero { exit_code: i32, stderr: String },
    #[error("input/output error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<ProcessError> for TargetError {
    fn from(error: ProcessError) -> Self {
        match error {
            ProcessError::Timeout(_) => Self::ExecTimeout,
            ProcessError::IoError(err) => Self::IoError(err),
            ProcessError::SignalError(err) => {
                Self::IoError(std::io::Error::other(err.to_string()))
            }
        }
    }
}

/// The capability set a backend-specific handler must implement. Neither
/// implementor carries any mutable state beyond its own configuration; both
/// are stateless with respect to the target itself.
pub trait Target: std::fmt::Debug {
    /// Locate a candidate running target.
    fn discover(&self) -> Result<TargetId, TargetError>;

    /// Cheap liveness probe, bounded to a couple of seconds.
    fn status(&self, target: &TargetId) -> Result<Status, TargetError>;

    /// Run `argv[0] argv[1..]` inside `target`, optionally streaming
    /// `stdin`/`stdout` through the host-side pipe, with the given
    /// environment variables set in the child (e.g. `PGPASSWORD`).
    fn exec(
        &self,
        target: &TargetId,
        argv: &[&OsStr],
        env: &[(&str, &str)],
        stdin: Input<'_>,
        stdout: Output,
        timeout: Duration,
    ) -> Result<i32, TargetError>;

    /// A stable, human-readable identifier recorded in sidecars.
    fn identity(&self, target: &TargetId) -> String;
}

/// Convenience: run `argv` in `target`, streaming a file's contents in as
/// stdin and discarding output, returning the exit code.
pub fn exec_with_stdin_file(
    target_handler: &dyn Target,
    target: &TargetId,
    argv: &[&OsStr],
    env: &[(&str, &str)],
    input: File,
    output: Output,
    timeout: Duration,
) -> Result<i32, TargetError> {
    target_handler.exec(target, argv, env, Input::File(input), output, timeout)
}
