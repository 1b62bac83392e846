//! Execute an external command with an argument vector, optional stdin, a
//! timeout, and a captured exit status/stderr.
//!
//! Never spawns a shell; arguments are passed through exactly as given. When
//! the caller supplies file handles for stdin/stdout, bytes are streamed
//! through without full in-memory buffering, since dumps can reach hundreds
//! of megabytes.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Where a child's stdin should come from.
pub enum Input<'a> {
    /// No input; the child's stdin is closed.
    None,
    /// Stream a byte buffer already in memory.
    Bytes(&'a [u8]),
    /// Stream from an open file, e.g. a backup artifact being restored.
    File(File),
}

/// Where a child's stdout should go.
pub enum Output {
    /// Capture stdout into memory (bounded use only; see [`Input::File`] for
    /// the unbounded case).
    Captured,
    /// Stream stdout directly into a file, e.g. a backup artifact being
    /// written.
    File(File),
}

/// The result of running a command to completion (or to timeout).
#[derive(Debug)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl RunOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum ProcessError {
    #[error("input/output error: {0}")]
    IoError(#[from] io::Error),
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("signalling child process failed: {0}")]
    SignalError(#[from] nix::Error),
}

/// Run `program` with `args`, the given `env`, streaming `stdin` in and
/// `stdout` out, killing the child if it outlives `timeout`.
///
/// Stderr is always captured (bounded implicitly by however much the child
/// writes before exiting or being killed); it is surfaced by the caller only
/// on failure or at verbose log level.
pub fn run<I, K, V>(
    program: &OsStr,
    args: I,
    env: impl IntoIterator<Item = (K, V)>,
    stdin: Input<'_>,
    stdout: Output,
    timeout: Duration,
) -> Result<RunOutcome, ProcessError>
where
    I: IntoIterator,
    I::Item: AsRef<OsStr>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    command.envs(env);
    command.stdin(match stdin {
        Input::None => Stdio::null(),
        Input::Bytes(_) => Stdio::piped(),
        Input::File(ref file) => Stdio::from(file.try_clone()?),
    });
    command.stdout(match stdout {
        Output::Captured => Stdio::piped(),
        Output::File(ref file) => Stdio::from(file.try_clone()?),
    });
    command.stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = command.spawn()?;

    // If the caller gave us an in-memory buffer to write to stdin, do that on
    // a separate thread so we don't deadlock with a child that's already
    // writing a full pipe's worth of stdout before we've finished writing
    // stdin. File-backed stdin needs no such thread; the kernel handles it.
    let writer = match stdin {
        Input::Bytes(bytes) => {
            let mut pipe = child.stdin.take().expect("stdin was piped");
            let bytes = bytes.to_vec();
            Some(std::thread::spawn(move || pipe.write_all(&bytes)))
        }
        Input::None | Input::File(_) => None,
    };

    let mut stdout_reader = child.stdout.take();
    let mut stderr_reader = child.stderr.take().expect("stderr was piped");

    let stdout_thread = stdout_reader.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_reader.read_to_end(&mut buf);
        buf
    });

    let status = wait_with_timeout(&mut child, timeout)?;
    let elapsed = start.elapsed();

    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let stdout = stdout_thread
        .map(|thread| thread.join().unwrap_or_default())
        .unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    match status {
        Some(status) => Ok(RunOutcome {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed,
        }),
        None => Err(ProcessError::Timeout(timeout)),
    }
}

/// Wait for `child` to exit, polling so that we can kill it if `timeout`
/// elapses. Returns `Ok(None)` (after killing the child) on timeout.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<std::process::ExitStatus>, ProcessError> {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(50);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            kill_with_grace(child, Duration::from_secs(5))?;
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(poll_interval.min(timeout.saturating_sub(start.elapsed())));
    }
}

/// Send `SIGTERM`, then `SIGKILL` after `grace` if the child hasn't exited.
/// Used both for timeouts (§4.1) and for SIGINT/SIGTERM cancellation of the
/// orchestrator itself (§5).
pub fn kill_with_grace(child: &mut Child, grace: Duration) -> Result<(), ProcessError> {
    let pid = Pid::from_raw(child.id() as i32);
    match signal::kill(pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(nix::Error::ESRCH) => return Ok(()), // already gone
        Err(err) => return Err(err.into()),
    }
    let start = Instant::now();
    while start.elapsed() < grace {
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    match signal::kill(pid, Signal::SIGKILL) {
        Ok(()) | Err(nix::Error::ESRCH) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn run_captures_stdout_and_exit_code() {
        let outcome = run::<_, &str, &str>(
            OsStr::new("printf"),
            ["hello"],
            [],
            Input::None,
            Output::Captured,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout, b"hello");
    }

    #[test]
    fn run_streams_bytes_into_stdin() {
        let outcome = run::<_, &str, &str>(
            OsStr::new("cat"),
            Vec::<&str>::new(),
            [],
            Input::Bytes(b"through the pipe"),
            Output::Captured,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout, b"through the pipe");
    }

    #[test]
    fn run_reports_nonzero_exit_code() {
        let outcome = run::<_, &str, &str>(
            OsStr::new("sh"),
            ["-c", "exit 7"],
            [],
            Input::None,
            Output::Captured,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(outcome.exit_code, Some(7));
    }

    #[test]
    fn run_times_out_long_running_child() {
        let result = run::<_, &str, &str>(
            OsStr::new("sleep"),
            ["5"],
            [],
            Input::None,
            Output::Captured,
            Duration::from_millis(100),
        );
        assert!(matches!(result, Err(ProcessError::Timeout(_))));
    }
}
