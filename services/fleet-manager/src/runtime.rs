//! Container runtime interface and in-memory implementation.
//!
//! The runtime interface is the only seam between the fleet manager and the
//! container engine:
//! - Creating and starting game-server containers
//! - Stopping, removing and restarting them
//! - Listing running containers and reading their logs
//!
//! An in-memory implementation is provided for testing and development.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Errors surfaced by a runtime backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A container with this name is already running.
    #[error("container '{0}' is already running")]
    AlreadyRunning(String),

    /// The container does not exist.
    #[error("container '{0}' not found")]
    NotFound(String),

    /// Any other runtime fault (daemon unreachable, port conflict, image pull
    /// failure). Transient and permanent faults are not distinguished.
    #[error("{0}")]
    Runtime(String),
}

impl RuntimeError {
    pub fn runtime(message: impl Into<String>) -> Self {
        RuntimeError::Runtime(message.into())
    }
}

/// Everything a backend needs to create one game-server container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name (`foundry-<N>`).
    pub name: String,

    /// Image reference.
    pub image: String,

    /// Port on the host, derived from environment and slot.
    pub host_port: u16,

    /// Port the game server listens on inside the container.
    pub container_port: u16,

    /// Boot-time environment variables.
    pub env: BTreeMap<String, String>,

    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

/// Filter for [`Runtime::list_running`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Only containers whose name starts with this prefix.
    pub name_prefix: Option<String>,
}

impl ListFilter {
    pub fn name_prefix(prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: Some(prefix.into()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name_prefix
            .as_deref()
            .is_none_or(|prefix| name.starts_with(prefix))
    }
}

/// A published port on a running container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    pub protocol: String,
}

/// A running container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub name: String,
    pub status: String,
    pub ports: Vec<PortMapping>,
}

/// Container runtime interface.
///
/// `stop` and `remove` are idempotent: an absent container is not an error.
/// Backends never retry on their own.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Create and start a container. Fails with
    /// [`RuntimeError::AlreadyRunning`] if one with the same name is running.
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<(), RuntimeError>;

    /// Stop a container.
    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    /// Remove a container.
    async fn remove(&self, name: &str) -> Result<(), RuntimeError>;

    /// Restart an existing container in place.
    async fn restart(&self, name: &str) -> Result<(), RuntimeError>;

    /// List running containers matching `filter`.
    async fn list_running(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Last `tail_lines` lines of a container's output.
    async fn logs(&self, name: &str, tail_lines: u32) -> Result<String, RuntimeError>;

    /// Check that the runtime is reachable.
    async fn ping(&self) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone)]
struct MockContainer {
    spec: Option<ContainerSpec>,
    running: bool,
    log: Vec<String>,
}

/// In-memory runtime for testing and development.
pub struct MockRuntime {
    containers: RwLock<HashMap<String, MockContainer>>,

    /// Whether every operation should fail with a runtime error.
    fail_all: bool,
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            fail_all: false,
        }
    }

    /// Create a mock runtime that fails every operation.
    pub fn failing() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            fail_all: true,
        }
    }

    /// Pretend a container named `name` is running, regardless of naming
    /// rules. Used to simulate containers the fleet manager did not create.
    pub async fn seed_running(&self, name: &str, host_port: Option<u16>) {
        let spec = host_port.map(|host_port| ContainerSpec {
            name: name.to_string(),
            image: "seeded".to_string(),
            host_port,
            container_port: host_port,
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
        });
        self.containers.write().await.insert(
            name.to_string(),
            MockContainer {
                spec,
                running: true,
                log: vec![format!("{name} seeded")],
            },
        );
    }

    /// Spec a container was created with, if it exists.
    pub async fn spec_of(&self, name: &str) -> Option<ContainerSpec> {
        self.containers
            .read()
            .await
            .get(name)
            .and_then(|c| c.spec.clone())
    }

    /// Whether a container with this name exists (running or not).
    pub async fn exists(&self, name: &str) -> bool {
        self.containers.read().await.contains_key(name)
    }

    fn check_failing(&self) -> Result<(), RuntimeError> {
        if self.fail_all {
            return Err(RuntimeError::runtime("mock runtime configured to fail"));
        }
        Ok(())
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        self.check_failing()?;

        let mut containers = self.containers.write().await;
        if containers.get(&spec.name).is_some_and(|c| c.running) {
            return Err(RuntimeError::AlreadyRunning(spec.name.clone()));
        }

        info!(
            container = %spec.name,
            image = %spec.image,
            host_port = spec.host_port,
            "[MOCK] Creating container"
        );

        containers.insert(
            spec.name.clone(),
            MockContainer {
                spec: Some(spec.clone()),
                running: true,
                log: vec![format!("{} started on port {}", spec.name, spec.container_port)],
            },
        );
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.check_failing()?;

        if let Some(container) = self.containers.write().await.get_mut(name) {
            debug!(container = %name, "[MOCK] Stopping container");
            container.running = false;
            container.log.push(format!("{name} stopped"));
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.check_failing()?;

        if self.containers.write().await.remove(name).is_some() {
            debug!(container = %name, "[MOCK] Removed container");
        }
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.check_failing()?;

        let mut containers = self.containers.write().await;
        let container = containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.running = true;
        container.log.push(format!("{name} restarted"));
        Ok(())
    }

    async fn list_running(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.check_failing()?;

        let containers = self.containers.read().await;
        let mut running: Vec<ContainerSummary> = containers
            .iter()
            .filter(|(name, c)| c.running && filter.matches(name))
            .map(|(name, c)| ContainerSummary {
                name: name.clone(),
                status: "running".to_string(),
                ports: c
                    .spec
                    .iter()
                    .map(|spec| PortMapping {
                        container_port: spec.container_port,
                        host_port: Some(spec.host_port),
                        protocol: "tcp".to_string(),
                    })
                    .collect(),
            })
            .collect();
        running.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(running)
    }

    async fn logs(&self, name: &str, tail_lines: u32) -> Result<String, RuntimeError> {
        self.check_failing()?;

        let containers = self.containers.read().await;
        let container = containers
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        let skip = container.log.len().saturating_sub(tail_lines as usize);
        Ok(container.log[skip..].join("\n"))
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.check_failing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: "test:latest".to_string(),
            host_port: 30000,
            container_port: 30000,
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_runtime_start_and_list() {
        let runtime = MockRuntime::new();
        runtime.create_and_start(&test_spec("foundry-1")).await.unwrap();

        let running = runtime
            .list_running(&ListFilter::name_prefix("foundry-"))
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].name, "foundry-1");
        assert_eq!(running[0].ports[0].host_port, Some(30000));
    }

    #[tokio::test]
    async fn test_mock_runtime_rejects_duplicate_start() {
        let runtime = MockRuntime::new();
        runtime.create_and_start(&test_spec("foundry-1")).await.unwrap();

        let err = runtime.create_and_start(&test_spec("foundry-1")).await.unwrap_err();
        assert_eq!(err, RuntimeError::AlreadyRunning("foundry-1".to_string()));
    }

    #[tokio::test]
    async fn test_mock_runtime_stop_and_remove_are_idempotent() {
        let runtime = MockRuntime::new();
        runtime.stop("foundry-2").await.unwrap();
        runtime.remove("foundry-2").await.unwrap();

        runtime.create_and_start(&test_spec("foundry-2")).await.unwrap();
        runtime.stop("foundry-2").await.unwrap();
        runtime.stop("foundry-2").await.unwrap();
        runtime.remove("foundry-2").await.unwrap();
        runtime.remove("foundry-2").await.unwrap();
        assert!(!runtime.exists("foundry-2").await);
    }

    #[tokio::test]
    async fn test_mock_runtime_stopped_container_can_be_recreated() {
        let runtime = MockRuntime::new();
        runtime.create_and_start(&test_spec("foundry-3")).await.unwrap();
        runtime.stop("foundry-3").await.unwrap();
        runtime.create_and_start(&test_spec("foundry-3")).await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_runtime_restart_and_logs_require_container() {
        let runtime = MockRuntime::new();
        assert_eq!(
            runtime.restart("foundry-4").await.unwrap_err(),
            RuntimeError::NotFound("foundry-4".to_string())
        );
        assert!(matches!(
            runtime.logs("foundry-4", 10).await,
            Err(RuntimeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_runtime_logs_tail() {
        let runtime = MockRuntime::new();
        runtime.create_and_start(&test_spec("foundry-1")).await.unwrap();
        runtime.restart("foundry-1").await.unwrap();
        runtime.restart("foundry-1").await.unwrap();

        let logs = runtime.logs("foundry-1", 2).await.unwrap();
        assert_eq!(logs, "foundry-1 restarted\nfoundry-1 restarted");
    }

    #[tokio::test]
    async fn test_mock_runtime_failing() {
        let runtime = MockRuntime::failing();
        let result = runtime.create_and_start(&test_spec("foundry-1")).await;
        assert!(matches!(result, Err(RuntimeError::Runtime(_))));
        assert!(runtime.ping().await.is_err());
    }
}
