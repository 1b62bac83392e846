//! Container-engine target handler (docker exec against a container).

use std::ffi::{OsStr, OsString};
use std::time::Duration;

use crate::process::{self, Input, Output};

use super::{Status, Target, TargetError, TargetId};

const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for talking to the local container engine's CLI client.
#[derive(Clone, Debug)]
pub struct ContainerTarget {
    /// Path to the client executable, e.g. `docker`.
    pub client: OsString,
    /// Explicit container name, if the operator named one with `--container`.
    pub container_name: Option<String>,
}

impl ContainerTarget {
    #[must_use]
    pub fn new(container_name: Option<String>) -> Self {
        Self {
            client: OsString::from("docker"),
            container_name,
        }
    }

    fn run(
        &self,
        args: &[&OsStr],
        env: &[(&str, &str)],
        stdin: Input<'_>,
        stdout: Output,
        timeout: Duration,
    ) -> Result<process::RunOutcome, TargetError> {
        Ok(process::run(&self.client, args, env.iter().copied(), stdin, stdout, timeout)?)
    }
}

impl Target for ContainerTarget {
    fn discover(&self) -> Result<TargetId, TargetError> {
        if let Some(name) = &self.container_name {
            return Ok(TargetId(name.clone()));
        }
        // `docker ps --format '{{.Names}}\t{{.Image}}'`, first row whose
        // image name contains "postgres".
        let args: &[&OsStr] = &[
            "ps".as_ref(),
            "--format".as_ref(),
            "{{.Names}}\t{{.Image}}".as_ref(),
        ];
        let outcome = self.run(args, &[], Input::None, Output::Captured, STATUS_TIMEOUT)?;
        if !outcome.success() {
            return Err(TargetError::TargetNotFound);
        }
        let stdout = String::from_utf8_lossy(&outcome.stdout);
        stdout
            .lines()
            .find_map(|line| {
                let (name, image) = line.split_once('\t')?;
                image.contains("postgres").then(|| TargetId(name.to_owned()))
            })
            .ok_or(TargetError::TargetNotFound)
    }

    fn status(&self, target: &TargetId) -> Result<Status, TargetError> {
        let args: &[&OsStr] = &[
            "inspect".as_ref(),
            "--format".as_ref(),
            "{{.State.Running}}".as_ref(),
            OsStr::new(target.0.as_str()),
        ];
        let outcome = self.run(args, &[], Input::None, Output::Captured, STATUS_TIMEOUT)?;
        if !outcome.success() {
            return Ok(Status::NotFound);
        }
        let running = String::from_utf8_lossy(&outcome.stdout).trim() == "true";
        Ok(if running {
            Status::Running
        } else {
            Status::NotRunning
        })
    }

    fn exec(
        &self,
        target: &TargetId,
        argv: &[&OsStr],
        env: &[(&str, &str)],
        stdin: Input<'_>,
        stdout: Output,
        timeout: Duration,
    ) -> Result<i32, TargetError> {
        let mut args: Vec<&OsStr> = vec!["exec".as_ref()];
        let env_flags: Vec<OsString> = env
            .iter()
            .map(|(k, v)| OsString::from(format!("{k}={v}")))
            .collect();
        let mut owned_env_flags = Vec::new();
        for flag in &env_flags {
            owned_env_flags.push(OsString::from("--env"));
            owned_env_flags.push(flag.clone());
        }
        let owned_refs: Vec<&OsStr> = owned_env_flags.iter().map(OsString::as_os_str).collect();
        args.extend(owned_refs);
        if !matches!(stdin, Input::None) {
            args.push("--interactive".as_ref());
        }
        args.push(OsStr::new(target.0.as_str()));
        args.extend_from_slice(argv);

        let outcome = self.run(&args, &[], stdin, stdout, timeout)?;
        match outcome.exit_code {
            Some(0) => Ok(0),
            Some(code) => Err(TargetError::ExecNonZero {
                exit_code: code,
                stderr: String::from_utf8_lossy(&outcome.stderr).into_owned(),
            }),
            None => Err(TargetError::ExecTimeout),
        }
    }

    fn identity(&self, target: &TargetId) -> String {
        format!("container:{}", target.0)
    }
}

#[cfg(test)]
mod tests {
    use super::ContainerTarget;

    #[test]
    fn discover_prefers_explicit_container_name() {
        let target = ContainerTarget::new(Some("my-postgres".to_owned()));
        assert_eq!(target.discover().unwrap().0, "my-postgres");
    }
}
