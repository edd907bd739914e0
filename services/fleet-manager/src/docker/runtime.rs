//! Docker runtime implementation.
//!
//! Maps the `Runtime` contract onto Engine API calls: 304/404 answers that
//! mean "already in the requested state" are treated as success, and all
//! other failures collapse into `RuntimeError::Runtime` with the daemon's
//! message.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::runtime::{
    ContainerSpec, ContainerSummary, ListFilter, PortMapping, Runtime, RuntimeError,
};

use super::api::{
    CreateContainerRequest, DockerApiError, DockerClient, EmptyObject, HostConfig, PortBinding,
    RestartPolicy,
};
use super::logs::demultiplex;

const NOT_MODIFIED: u16 = 304;
const NOT_FOUND: u16 = 404;
const CONFLICT: u16 = 409;

/// Configuration for the Docker runtime.
#[derive(Debug, Clone)]
pub struct DockerRuntimeConfig {
    /// Path to the Engine API socket.
    pub socket_path: PathBuf,
    /// Grace period before the daemon kills a stopping container.
    pub stop_timeout_secs: u64,
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/docker.sock"),
            stop_timeout_secs: 10,
        }
    }
}

/// Docker runtime for production use.
pub struct DockerRuntime {
    config: DockerRuntimeConfig,
    client: DockerClient,
}

impl DockerRuntime {
    /// Create a new Docker runtime.
    pub fn new(config: DockerRuntimeConfig) -> Self {
        let client = DockerClient::new(&config.socket_path);
        if !client.socket_exists() {
            warn!(
                socket = %config.socket_path.display(),
                "Docker socket not found; runtime calls will fail until it appears"
            );
        }
        Self { config, client }
    }

    fn create_request(spec: &ContainerSpec) -> CreateContainerRequest {
        let port_key = format!("{}/tcp", spec.container_port);
        CreateContainerRequest {
            image: spec.image.clone(),
            env: spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            labels: spec.labels.clone(),
            exposed_ports: BTreeMap::from([(port_key.clone(), EmptyObject::default())]),
            host_config: HostConfig {
                port_bindings: BTreeMap::from([(
                    port_key,
                    vec![PortBinding {
                        host_ip: String::new(),
                        host_port: spec.host_port.to_string(),
                    }],
                )]),
                restart_policy: RestartPolicy {
                    name: "unless-stopped".to_string(),
                },
            },
        }
    }

    /// Create the container, pulling the image first if the daemon lacks it.
    async fn create(&self, spec: &ContainerSpec) -> Result<(), DockerApiError> {
        let request = Self::create_request(spec);
        let response = match self.client.create_container(&spec.name, &request).await {
            Err(e) if e.status() == Some(NOT_FOUND) => {
                info!(image = %spec.image, "Image not present, pulling");
                self.client.pull_image(&spec.image).await?;
                self.client.create_container(&spec.name, &request).await?
            }
            other => other?,
        };

        for warning in response.warnings.unwrap_or_default() {
            warn!(container = %spec.name, warning = %warning, "Docker create warning");
        }
        debug!(container = %spec.name, id = %response.id, "Container created");
        Ok(())
    }
}

fn runtime_error(context: &str, err: DockerApiError) -> RuntimeError {
    RuntimeError::Runtime(format!("{context}: {err}"))
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        match self.create(spec).await {
            Ok(()) => {}
            Err(e) if e.status() == Some(CONFLICT) => {
                // The name is taken. A running holder wins; a stopped leftover
                // from a crash or manual stop is cleared so the slot is usable.
                let inspect = self
                    .client
                    .inspect_container(&spec.name)
                    .await
                    .map_err(|e| runtime_error("inspect failed", e))?;
                if inspect.state.running {
                    return Err(RuntimeError::AlreadyRunning(spec.name.clone()));
                }

                warn!(
                    container = %spec.name,
                    state = %inspect.state.status,
                    "Removing stale container before create"
                );
                self.remove(&spec.name).await?;
                self.create(spec)
                    .await
                    .map_err(|e| match e.status() {
                        Some(CONFLICT) => RuntimeError::AlreadyRunning(spec.name.clone()),
                        _ => runtime_error("create failed", e),
                    })?;
            }
            Err(e) => return Err(runtime_error("create failed", e)),
        }

        match self.client.start_container(&spec.name).await {
            Ok(()) => {
                info!(container = %spec.name, host_port = spec.host_port, "Container started");
                Ok(())
            }
            Err(e) if e.status() == Some(NOT_MODIFIED) => {
                Err(RuntimeError::AlreadyRunning(spec.name.clone()))
            }
            Err(e) => Err(runtime_error("start failed", e)),
        }
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        match self
            .client
            .stop_container(name, self.config.stop_timeout_secs)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.status(), Some(NOT_MODIFIED | NOT_FOUND)) => {
                debug!(container = %name, "Container already stopped or absent");
                Ok(())
            }
            Err(e) => Err(runtime_error("stop failed", e)),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        match self.client.remove_container(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.status() == Some(NOT_FOUND) => {
                debug!(container = %name, "Container already removed");
                Ok(())
            }
            Err(e) => Err(runtime_error("remove failed", e)),
        }
    }

    async fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        match self
            .client
            .restart_container(name, self.config.stop_timeout_secs)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.status() == Some(NOT_FOUND) => Err(RuntimeError::NotFound(name.to_string())),
            Err(e) => Err(runtime_error("restart failed", e)),
        }
    }

    async fn list_running(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let entries = self
            .client
            .list_containers()
            .await
            .map_err(|e| runtime_error("list failed", e))?;

        let mut running: Vec<ContainerSummary> = entries
            .into_iter()
            .filter_map(|entry| {
                // Engine names carry a leading slash; linked aliases contain more.
                let name = entry
                    .names
                    .iter()
                    .map(|n| n.trim_start_matches('/'))
                    .find(|n| !n.contains('/'))?
                    .to_string();
                if !filter.matches(&name) {
                    return None;
                }
                Some(ContainerSummary {
                    name,
                    status: entry.status,
                    ports: entry
                        .ports
                        .into_iter()
                        .map(|p| PortMapping {
                            container_port: p.private_port,
                            host_port: p.public_port,
                            protocol: p.protocol,
                        })
                        .collect(),
                })
            })
            .collect();
        running.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(running)
    }

    async fn logs(&self, name: &str, tail_lines: u32) -> Result<String, RuntimeError> {
        match self.client.container_logs(name, tail_lines).await {
            Ok(raw) => Ok(demultiplex(&raw)),
            Err(e) if e.status() == Some(NOT_FOUND) => Err(RuntimeError::NotFound(name.to_string())),
            Err(e) => Err(runtime_error("logs failed", e)),
        }
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.client
            .ping()
            .await
            .map_err(|e| runtime_error("ping failed", e))
    }
}
