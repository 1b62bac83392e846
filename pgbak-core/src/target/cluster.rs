//! Cluster-orchestrator target handler (kubectl exec against a pod).

use std::ffi::{OsStr, OsString};
use std::time::Duration;

use shell_quote::sh::escape_into;

use crate::process::{self, Input, Output};

use super::{Status, Target, TargetError, TargetId};

const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Default label selector used to find a PostgreSQL pod when none is named.
pub const DEFAULT_LABEL_SELECTOR: &str = "app=postgres";

/// Default namespace searched when the operator doesn't name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Configuration for talking to the cluster orchestrator's CLI client.
#[derive(Clone, Debug)]
pub struct ClusterTarget {
    /// Path to the client executable, e.g. `kubectl`.
    pub client: OsString,
    pub namespace: String,
    pub label_selector: String,
    /// Explicit pod name, if the operator named one with `--pod`.
    pub pod_name: Option<String>,
    /// Container within the pod, if it has more than one.
    pub container_name: Option<String>,
}

impl ClusterTarget {
    #[must_use]
    pub fn new(pod_name: Option<String>, namespace: Option<String>, container_name: Option<String>) -> Self {
        Self::with_label_selector(pod_name, namespace, container_name, None)
    }

    #[must_use]
    pub fn with_label_selector(
        pod_name: Option<String>,
        namespace: Option<String>,
        container_name: Option<String>,
        label_selector: Option<String>,
    ) -> Self {
        Self {
            client: OsString::from("kubectl"),
            namespace: namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned()),
            label_selector: label_selector.unwrap_or_else(|| DEFAULT_LABEL_SELECTOR.to_owned()),
            pod_name,
            container_name,
        }
    }

    fn run(
        &self,
        args: &[&OsStr],
        stdin: Input<'_>,
        stdout: Output,
        timeout: Duration,
    ) -> Result<process::RunOutcome, TargetError> {
        Ok(process::run::<_, &str, &str>(&self.client, args.iter().copied(), [], stdin, stdout, timeout)?)
    }
}

impl Target for ClusterTarget {
    fn discover(&self) -> Result<TargetId, TargetError> {
        if let Some(name) = &self.pod_name {
            return Ok(TargetId(name.clone()));
        }
        // `kubectl get pods -n <ns> -l <selector> --field-selector=status.phase=Running
        //  -o jsonpath='{.items[*].metadata.name}'`
        let field_selector = "--field-selector=status.phase=Running";
        let jsonpath = "-o=jsonpath={.items[*].metadata.name}";
        let args: &[&OsStr] = &[
            "get".as_ref(),
            "pods".as_ref(),
            "-n".as_ref(),
            OsStr::new(self.namespace.as_str()),
            "-l".as_ref(),
            OsStr::new(self.label_selector.as_str()),
            field_selector.as_ref(),
            jsonpath.as_ref(),
        ];
        let outcome = self.run(args, Input::None, Output::Captured, STATUS_TIMEOUT)?;
        if !outcome.success() {
            return Err(TargetError::TargetNotFound);
        }
        let stdout = String::from_utf8_lossy(&outcome.stdout);
        stdout
            .split_whitespace()
            .next()
            .map(|name| TargetId(name.to_owned()))
            .ok_or(TargetError::TargetNotFound)
    }

    fn status(&self, target: &TargetId) -> Result<Status, TargetError> {
        let jsonpath = "-o=jsonpath={.status.phase}";
        let args: &[&OsStr] = &[
            "get".as_ref(),
            "pod".as_ref(),
            OsStr::new(target.0.as_str()),
            "-n".as_ref(),
            OsStr::new(self.namespace.as_str()),
            jsonpath.as_ref(),
        ];
        let outcome = self.run(args, Input::None, Output::Captured, STATUS_TIMEOUT)?;
        if !outcome.success() {
            return Ok(Status::NotFound);
        }
        let phase = String::from_utf8_lossy(&outcome.stdout);
        Ok(match phase.trim() {
            "Running" => Status::Running,
            "" => Status::NotFound,
            _ => Status::NotRunning,
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
        let mut args: Vec<&OsStr> = vec!["exec".as_ref(), OsStr::new(target.0.as_str())];
        args.push("-n".as_ref());
        args.push(OsStr::new(self.namespace.as_str()));
        if let Some(container) = &self.container_name {
            args.push("-c".as_ref());
            args.push(OsStr::new(container.as_str()));
        }
        let has_stdin = !matches!(stdin, Input::None);
        if has_stdin {
            args.push("--stdin".as_ref());
        }
        args.push("--tty=false".as_ref());
        args.push("--".as_ref());

        // `kubectl exec` doesn't forward an environment to the remote
        // process; wrap in `sh -c` with inline assignments when the caller
        // needs any set, per the "shell redirection" design note in §9.
        let wrapped;
        if env.is_empty() {
            args.extend_from_slice(argv);
        } else {
            let mut line = Vec::new();
            for (key, value) in env {
                line.extend_from_slice(key.as_bytes());
                line.push(b'=');
                escape_into(value, &mut line);
                line.push(b' ');
            }
            line.extend_from_slice(b"exec");
            for part in argv {
                line.push(b' ');
                escape_into(part.to_string_lossy().as_ref(), &mut line);
            }
            wrapped = String::from_utf8(line).expect("shell-escaped argv is valid UTF-8");
            args.push("sh".as_ref());
            args.push("-c".as_ref());
            args.push(OsStr::new(wrapped.as_str()));
        }

        let outcome = self.run(&args, stdin, stdout, timeout)?;
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
        match &self.container_name {
            Some(container) => format!("pod:{}/{}:{container}", self.namespace, target.0),
            None => format!("pod:{}/{}", self.namespace, target.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusterTarget, DEFAULT_NAMESPACE};

    #[test]
    fn discover_prefers_explicit_pod_name() {
        let target = ClusterTarget::new(Some("postgres-0".to_owned()), None, None);
        assert_eq!(target.discover().unwrap().0, "postgres-0");
    }

    #[test]
    fn falls_back_to_default_namespace() {
        let target = ClusterTarget::new(None, None, None);
        assert_eq!(target.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn identity_includes_container_when_named() {
        let target = ClusterTarget::new(
            Some("postgres-0".to_owned()),
            Some("db".to_owned()),
            Some("postgres".to_owned()),
        );
        let id = super::TargetId("postgres-0".to_owned());
        assert_eq!(target.identity(&id), "pod:db/postgres-0:postgres");
    }
}
