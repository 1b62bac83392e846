//! Probe host signals and choose a backend.
//!
//! Detection is expressed as a pure function over [`DetectInputs`] rather
//! than reading `std::env`/the filesystem directly, so it can be exercised
//! without a real container engine or cluster present.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the environment variable Kubernetes sets in every pod, and the
/// one we check to decide whether we're running against a cluster.
pub const CLUSTER_SERVICE_HOST_VAR: &str = "KUBERNETES_SERVICE_HOST";

/// Conventional location of the container engine's control socket.
pub const CONTAINER_ENGINE_SOCKET: &str = "/var/run/docker.sock";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Container,
    Cluster,
}

/// An explicit operator override, bypassing detection entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Override {
    ForceContainer,
    ForceCluster,
}

/// Everything [`detect`] needs to know, gathered up front so the decision
/// itself has no hidden dependencies on ambient global state.
#[derive(Debug, Default)]
pub struct DetectInputs {
    pub r#override: Option<Override>,
    pub cluster_service_host_set: bool,
    pub container_socket_present: bool,
    /// Whether `<container-engine> ps` exits zero within its 2s budget. Only
    /// consulted when `container_socket_present` is false (socket-or-working-
    /// client rule).
    pub container_client_responsive: bool,
}

impl DetectInputs {
    /// Gather real inputs from the process environment and filesystem.
    #[must_use]
    pub fn gather(r#override: Option<Override>) -> Self {
        let cluster_service_host_set = std::env::var_os(CLUSTER_SERVICE_HOST_VAR).is_some();
        let container_socket_present = Path::new(CONTAINER_ENGINE_SOCKET).exists();
        let container_client_responsive =
            !container_socket_present && probe_container_client(Duration::from_secs(2));
        Self {
            r#override,
            cluster_service_host_set,
            container_socket_present,
            container_client_responsive,
        }
    }
}

/// Run `docker ps` with a short deadline to see if the container engine's
/// client is usable even without direct socket access.
fn probe_container_client(timeout: Duration) -> bool {
    let Ok(path) = which("docker") else {
        return false;
    };
    crate::process::run::<_, &str, &str>(
        path.as_os_str(),
        ["ps"],
        [],
        crate::process::Input::None,
        crate::process::Output::Captured,
        timeout,
    )
    .map(|outcome| outcome.success())
    .unwrap_or(false)
}

fn which(program: &str) -> Result<PathBuf, ()> {
    std::env::var_os("PATH")
        .into_iter()
        .flat_map(|path| std::env::split_paths(&path).collect::<Vec<_>>())
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
        .ok_or(())
}

/// Choose a backend given `inputs`: override first, then the
/// cluster-service-host variable, then container socket/client, else
/// `None` (fatal at the orchestrator level).
#[must_use]
pub fn detect(inputs: &DetectInputs) -> Option<Backend> {
    if let Some(r#override) = inputs.r#override {
        return Some(match r#override {
            Override::ForceContainer => Backend::Container,
            Override::ForceCluster => Backend::Cluster,
        });
    }
    if inputs.cluster_service_host_set {
        return Some(Backend::Cluster);
    }
    if inputs.container_socket_present || inputs.container_client_responsive {
        return Some(Backend::Container);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{detect, Backend, DetectInputs, Override};

    #[test]
    fn override_wins_regardless_of_other_signals() {
        let inputs = DetectInputs {
            r#override: Some(Override::ForceCluster),
            cluster_service_host_set: false,
            container_socket_present: true,
            container_client_responsive: true,
        };
        assert_eq!(detect(&inputs), Some(Backend::Cluster));
    }

    #[test]
    fn cluster_service_host_selects_cluster_before_container_checks() {
        let inputs = DetectInputs {
            r#override: None,
            cluster_service_host_set: true,
            container_socket_present: true,
            container_client_responsive: true,
        };
        assert_eq!(detect(&inputs), Some(Backend::Cluster));
    }

    #[test]
    fn container_socket_selects_container() {
        let inputs = DetectInputs {
            r#override: None,
            cluster_service_host_set: false,
            container_socket_present: true,
            container_client_responsive: false,
        };
        assert_eq!(detect(&inputs), Some(Backend::Container));
    }

    #[test]
    fn responsive_client_selects_container_without_socket() {
        let inputs = DetectInputs {
            r#override: None,
            cluster_service_host_set: false,
            container_socket_present: false,
            container_client_responsive: true,
        };
        assert_eq!(detect(&inputs), Some(Backend::Container));
    }

    #[test]
    fn no_signals_is_unknown() {
        let inputs = DetectInputs::default();
        assert_eq!(detect(&inputs), None);
    }
}
