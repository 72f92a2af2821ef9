//! Docker daemon access for the built-in runners.
//!
//! [`DockerDaemon`] is a thin wrapper over `Arc<bollard::Docker>`; the
//! built-in runners describe the container they need as a [`ContainerSpec`]
//! and get back a [`DockerContainer`] with its published host ports resolved.
//! Readiness is log based: [`DockerDaemon::wait_for_log`] follows the
//! container's output until a pattern has appeared the required number of
//! times.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use berth_core::config::DockerSection;
use berth_core::error::ServiceError;

use crate::container::Container;

/// Describes one container to run.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Service name, used for logging and error messages.
    pub name: String,
    /// Image reference, pulled if missing.
    pub image: String,
    /// Environment in `KEY=value` form.
    pub env: Vec<String>,
    /// Command override.
    pub cmd: Option<Vec<String>>,
    /// Container ports published to ephemeral host ports on 127.0.0.1.
    pub ports: Vec<u16>,
    /// Bind mounts in `host:container` form.
    pub binds: Vec<String>,
    /// Substring whose appearance in the logs signals readiness.
    pub ready_pattern: String,
    /// How many times the pattern must appear.
    pub ready_occurrences: usize,
    /// Upper bound on the readiness wait.
    pub ready_timeout: Duration,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            cmd: None,
            ports: Vec::new(),
            binds: Vec::new(),
            ready_pattern: String::new(),
            ready_occurrences: 1,
            ready_timeout: Duration::from_secs(60),
        }
    }
}

/// Connection to the Docker daemon, shared by all containers it started.
#[derive(Debug, Clone)]
pub struct DockerDaemon {
    docker: Arc<bollard::Docker>,
}

impl DockerDaemon {
    /// Connects using the platform's default local socket.
    pub fn connect_local() -> Result<Self, ServiceError> {
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| ServiceError::Runtime(format!("failed to connect to docker: {e}")))?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, ServiceError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ServiceError::Runtime(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects per the `[docker]` config section: a configured socket
    /// path wins over the platform default.
    pub fn connect(section: &DockerSection) -> Result<Self, ServiceError> {
        match &section.socket {
            Some(path) => Self::connect_with_socket(path),
            None => Self::connect_local(),
        }
    }

    /// Checks daemon connectivity.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ServiceError::Runtime(format!("docker ping failed: {e}")))?;
        Ok(())
    }

    /// Runs a container per the spec and waits until it reports ready.
    ///
    /// Pulls the image if missing, creates the container with every spec port
    /// published to an ephemeral host port, starts it, waits for the ready
    /// pattern, then resolves the host port mappings. A failure after create
    /// leaves removal to the caller's cleanup path.
    pub async fn run(
        &self,
        spec: &ContainerSpec,
        cancel: &CancellationToken,
    ) -> Result<DockerContainer, ServiceError> {
        self.ensure_image(&spec.image, cancel).await?;

        let id = self.create(spec).await?;
        debug!(service = %spec.name, container = %id, "container created");

        self.docker
            .start_container(&id, None::<bollard::container::StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                ServiceError::Runtime(format!("failed to start container for '{}': {e}", spec.name))
            })?;

        if !spec.ready_pattern.is_empty() {
            self.wait_for_log(
                &id,
                &spec.ready_pattern,
                spec.ready_occurrences,
                spec.ready_timeout,
                cancel,
            )
            .await?;
        }

        let ports = self.resolve_ports(&id).await?;
        debug!(service = %spec.name, container = %id, ?ports, "container ready");

        Ok(DockerContainer {
            id,
            name: spec.name.clone(),
            ports,
            daemon: self.clone(),
        })
    }

    /// Follows the container's logs until `pattern` has appeared
    /// `occurrences` times, or the timeout/cancellation fires.
    pub async fn wait_for_log(
        &self,
        id: &str,
        pattern: &str,
        occurrences: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let options = bollard::container::LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut logs = self.docker.logs(id, Some(options));

        let mut hits = 0usize;
        let mut tail = String::new();
        let wait = async {
            while let Some(chunk) = logs.next().await {
                let chunk = chunk
                    .map_err(|e| ServiceError::Runtime(format!("log stream error: {e}")))?;
                tail.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
                while let Some(pos) = tail.find('\n') {
                    let line: String = tail.drain(..=pos).collect();
                    hits += line.matches(pattern).count();
                }
                // the unfinished last line counts tentatively, without
                // committing, so a pattern split across chunks is not missed
                if hits + tail.matches(pattern).count() >= occurrences {
                    return Ok(());
                }
            }
            Err(ServiceError::Runtime(format!(
                "container {id} log stream ended before pattern {pattern:?} appeared"
            )))
        };

        tokio::select! {
            result = tokio::time::timeout(timeout, wait) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ServiceError::Runtime(format!(
                    "container {id} not ready: pattern {pattern:?} not seen within {}s",
                    timeout.as_secs()
                ))),
            },
            () = cancel.cancelled() => Err(ServiceError::Runtime(format!(
                "readiness wait for container {id} was cancelled"
            ))),
        }
    }

    /// Force-removes a container together with its anonymous volumes.
    pub async fn remove(&self, id: &str) -> Result<(), ServiceError> {
        let options = bollard::container::RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| ServiceError::Runtime(format!("failed to remove container {id}: {e}")))
    }

    async fn ensure_image(
        &self,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        debug!(image, "pulling image");
        let options = bollard::image::CreateImageOptions {
            from_image: image.to_owned(),
            ..Default::default()
        };
        let mut pull = self.docker.create_image(Some(options), None, None);
        loop {
            tokio::select! {
                item = pull.next() => match item {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(ServiceError::Runtime(format!(
                            "failed to pull image {image}: {e}"
                        )));
                    }
                    None => return Ok(()),
                },
                () = cancel.cancelled() => {
                    return Err(ServiceError::Runtime(format!(
                        "pull of image {image} was cancelled"
                    )));
                }
            }
        }
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, ServiceError> {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for port in &spec.ports {
            let key = format!("{port}/tcp");
            exposed_ports.insert(key.clone(), HashMap::<(), ()>::new());
            port_bindings.insert(
                key,
                Some(vec![bollard::models::PortBinding {
                    host_ip: Some("127.0.0.1".to_owned()),
                    // host port 0 lets the daemon pick an ephemeral port
                    host_port: Some("0".to_owned()),
                }]),
            );
        }

        let host_config = bollard::models::HostConfig {
            port_bindings: Some(port_bindings),
            binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
            ..Default::default()
        };

        let config = bollard::container::Config {
            image: Some(spec.image.clone()),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            cmd: spec.cmd.clone(),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<bollard::container::CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| {
                ServiceError::Runtime(format!(
                    "failed to create container for '{}': {e}",
                    spec.name
                ))
            })?;
        Ok(created.id)
    }

    async fn resolve_ports(&self, id: &str) -> Result<HashMap<u16, u16>, ServiceError> {
        let details = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| ServiceError::Runtime(format!("failed to inspect container {id}: {e}")))?;

        let mut ports = HashMap::new();
        let bindings = details
            .network_settings
            .and_then(|s| s.ports)
            .unwrap_or_default();
        for (container_port, host_bindings) in bindings {
            let Some(container_port) = container_port
                .split('/')
                .next()
                .and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };
            let host_port = host_bindings
                .unwrap_or_default()
                .into_iter()
                .find_map(|b| b.host_port.and_then(|p| p.parse::<u16>().ok()));
            if let Some(host_port) = host_port {
                ports.insert(container_port, host_port);
            }
        }
        Ok(ports)
    }
}

/// A container started by [`DockerDaemon::run`].
#[derive(Debug, Clone)]
pub struct DockerContainer {
    id: String,
    name: String,
    ports: HashMap<u16, u16>,
    daemon: DockerDaemon,
}

impl DockerContainer {
    /// Service name the container was started for.
    pub fn service_name(&self) -> &str {
        &self.name
    }
}

impl Container for DockerContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }

    async fn terminate(&self, _cancel: CancellationToken) -> Result<(), ServiceError> {
        self.daemon.remove(&self.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_spec_defaults() {
        let spec = ContainerSpec::new("postgres", "postgres:16-alpine");
        assert_eq!(spec.name, "postgres");
        assert_eq!(spec.image, "postgres:16-alpine");
        assert_eq!(spec.ready_occurrences, 1);
        assert_eq!(spec.ready_timeout, Duration::from_secs(60));
        assert!(spec.env.is_empty());
        assert!(spec.cmd.is_none());
    }
}
