//! Instance manager: lifecycle of game-server containers.
//!
//! The instance manager:
//! - Validates requests and resolves container identity through the registry
//! - Enforces that a caller only touches containers of its own environment
//! - Delegates execution to the container runtime
//!
//! No instance state is kept here. The runtime is the source of truth and
//! every status call asks it again.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use foundry_registry::{self as registry, Environment, CONTAINER_PREFIX, SLOTS_PER_ENVIRONMENT};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::FleetError;
use crate::runtime::{ContainerSpec, ListFilter, PortMapping, Runtime, RuntimeError};

/// Largest log tail a caller may request.
pub const MAX_LOG_TAIL: u32 = 10_000;

/// Caller-supplied start parameters. The identifiers are opaque here.
#[derive(Debug, Clone)]
pub struct InstanceRequest {
    pub world_id: String,
    pub owner_id: String,
    pub slot: i64,
    pub license_key: String,
}

/// Identity of a started instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub container_name: String,
    pub environment: Environment,
    pub port: u16,
}

/// A running instance as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningInstance {
    pub name: String,
    pub slot: i64,
    pub status: String,
    pub ports: Vec<PortMapping>,
}

/// Static settings for containers created by the manager.
#[derive(Debug, Clone)]
pub struct InstanceManagerConfig {
    /// Game-server image.
    pub image: String,
    /// Port the game server listens on inside the container.
    pub container_port: u16,
}

impl Default for InstanceManagerConfig {
    fn default() -> Self {
        Self {
            image: "felddy/foundryvtt:release".to_string(),
            container_port: 30000,
        }
    }
}

/// Instance manager.
pub struct InstanceManager {
    /// Runtime for container lifecycle operations.
    runtime: Arc<dyn Runtime>,

    config: InstanceManagerConfig,

    /// One lock per fleet container name, serializing mutations of a slot.
    locks: HashMap<String, Mutex<()>>,
}

impl InstanceManager {
    /// Create a new instance manager.
    pub fn new(runtime: Arc<dyn Runtime>, config: InstanceManagerConfig) -> Self {
        let locks = Environment::ALL
            .into_iter()
            .flat_map(|env| (0..SLOTS_PER_ENVIRONMENT).map(move |slot| (env, slot)))
            .filter_map(|(env, slot)| registry::container_name(env, slot).ok())
            .map(|name| (name, Mutex::new(())))
            .collect();

        Self {
            runtime,
            config,
            locks,
        }
    }

    /// Check that the runtime is reachable.
    pub async fn runtime_ready(&self) -> Result<(), FleetError> {
        Ok(self.runtime.ping().await?)
    }

    /// Start the instance for `request.slot` in `env`.
    pub async fn start_instance(
        &self,
        request: &InstanceRequest,
        env: Environment,
    ) -> Result<InstanceConfig, FleetError> {
        validate_request(request)?;

        let container_name = registry::container_name(env, request.slot)?;
        let port = registry::port(env, request.slot)?;

        let spec = ContainerSpec {
            name: container_name.clone(),
            image: self.config.image.clone(),
            host_port: port,
            container_port: self.config.container_port,
            env: BTreeMap::from([
                ("FOUNDRY_WORLD_ID".to_string(), request.world_id.clone()),
                ("FOUNDRY_OWNER_ID".to_string(), request.owner_id.clone()),
                ("FOUNDRY_LICENSE_KEY".to_string(), request.license_key.clone()),
                ("FOUNDRY_ENVIRONMENT".to_string(), env.to_string()),
            ]),
            labels: BTreeMap::from([
                ("foundry.environment".to_string(), env.to_string()),
                ("foundry.slot".to_string(), request.slot.to_string()),
                ("foundry.world-id".to_string(), request.world_id.clone()),
                ("foundry.owner-id".to_string(), request.owner_id.clone()),
            ]),
        };

        let _guard = self.lock(&container_name).await;
        info!(
            container = %container_name,
            environment = %env,
            slot = request.slot,
            port,
            world_id = %request.world_id,
            owner_id = %request.owner_id,
            "Starting instance"
        );

        if let Err(e) = self.runtime.create_and_start(&spec).await {
            log_runtime_failure("start", &container_name, env, &e);
            return Err(e.into());
        }

        Ok(InstanceConfig {
            container_name,
            environment: env,
            port,
        })
    }

    /// Stop and remove `name`. Succeeds if the container is already gone.
    pub async fn stop_instance(&self, name: &str, env: Environment) -> Result<(), FleetError> {
        registry::validate_ownership(name, env).map_err(|e| FleetError::for_environment(e, env))?;

        let _guard = self.lock(name).await;
        info!(container = %name, environment = %env, "Stopping instance");

        let result = match self.runtime.stop(name).await {
            Ok(()) => self.runtime.remove(name).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log_runtime_failure("stop", name, env, &e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Restart `name` in place. Identity and image are unchanged.
    pub async fn restart_instance(&self, name: &str, env: Environment) -> Result<(), FleetError> {
        registry::validate_ownership(name, env).map_err(|e| FleetError::for_environment(e, env))?;

        let _guard = self.lock(name).await;
        info!(container = %name, environment = %env, "Restarting instance");

        if let Err(e) = self.runtime.restart(name).await {
            log_runtime_failure("restart", name, env, &e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Running instances of `env`.
    ///
    /// Results are re-checked against the registry so that a runtime
    /// reporting another environment's containers cannot leak them.
    pub async fn get_instance_status(
        &self,
        env: Environment,
    ) -> Result<Vec<RunningInstance>, FleetError> {
        let containers = self
            .runtime
            .list_running(&ListFilter::name_prefix(CONTAINER_PREFIX))
            .await
            .map_err(|e| {
                log_runtime_failure("status", "*", env, &e);
                FleetError::from(e)
            })?;

        let running = containers
            .into_iter()
            .filter_map(|container| match registry::slot_of(&container.name, env) {
                Ok(slot) => Some(RunningInstance {
                    name: container.name,
                    slot,
                    status: container.status,
                    ports: container.ports,
                }),
                Err(e) => {
                    debug!(container = %container.name, reason = %e, "Excluded from status");
                    None
                }
            })
            .collect();
        Ok(running)
    }

    /// Last `tail` log lines of `name`.
    pub async fn get_instance_logs(
        &self,
        name: &str,
        env: Environment,
        tail: u32,
    ) -> Result<String, FleetError> {
        registry::validate_ownership(name, env).map_err(|e| FleetError::for_environment(e, env))?;

        if !(1..=MAX_LOG_TAIL).contains(&tail) {
            return Err(FleetError::Validation(format!(
                "tail must be between 1 and {MAX_LOG_TAIL}"
            )));
        }

        self.runtime.logs(name, tail).await.map_err(|e| {
            log_runtime_failure("logs", name, env, &e);
            FleetError::from(e)
        })
    }

    async fn lock(&self, name: &str) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        Some(self.locks.get(name)?.lock().await)
    }
}

fn validate_request(request: &InstanceRequest) -> Result<(), FleetError> {
    let fields = [
        ("worldId", &request.world_id),
        ("ownerId", &request.owner_id),
        ("licenseKey", &request.license_key),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(FleetError::Validation(format!("{field} is required")));
        }
    }

    if !(0..SLOTS_PER_ENVIRONMENT).contains(&request.slot) {
        return Err(FleetError::Validation(format!(
            "slot must be between 0 and {}",
            SLOTS_PER_ENVIRONMENT - 1
        )));
    }
    Ok(())
}

fn log_runtime_failure(operation: &str, container: &str, env: Environment, err: &RuntimeError) {
    match err {
        RuntimeError::Runtime(_) => {
            error!(operation, container = %container, environment = %env, error = %err, "Runtime operation failed")
        }
        _ => {
            warn!(operation, container = %container, environment = %env, error = %err, "Runtime rejected operation")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    fn request(slot: i64) -> InstanceRequest {
        InstanceRequest {
            world_id: "w1".to_string(),
            owner_id: "o1".to_string(),
            slot,
            license_key: "L".to_string(),
        }
    }

    fn manager() -> (Arc<MockRuntime>, InstanceManager) {
        let runtime = Arc::new(MockRuntime::new());
        let manager = InstanceManager::new(runtime.clone(), InstanceManagerConfig::default());
        (runtime, manager)
    }

    #[tokio::test]
    async fn test_start_injects_request_into_container() {
        let (runtime, manager) = manager();
        let config = manager
            .start_instance(&request(1), Environment::Production)
            .await
            .unwrap();

        assert_eq!(config.container_name, "foundry-5");
        assert_eq!(config.port, 30101);

        let spec = runtime.spec_of("foundry-5").await.unwrap();
        assert_eq!(spec.host_port, 30101);
        assert_eq!(spec.container_port, 30000);
        assert_eq!(spec.env["FOUNDRY_WORLD_ID"], "w1");
        assert_eq!(spec.env["FOUNDRY_OWNER_ID"], "o1");
        assert_eq!(spec.env["FOUNDRY_LICENSE_KEY"], "L");
        assert_eq!(spec.labels["foundry.environment"], "production");
    }

    #[tokio::test]
    async fn test_start_validates_input() {
        let (runtime, manager) = manager();

        for slot in [-1, 3, 100] {
            let err = manager
                .start_instance(&request(slot), Environment::Staging)
                .await
                .unwrap_err();
            assert!(matches!(err, FleetError::Validation(_)), "slot {slot}");
        }

        let mut blank = request(0);
        blank.license_key = "  ".to_string();
        let err = manager
            .start_instance(&blank, Environment::Staging)
            .await
            .unwrap_err();
        assert_eq!(err, FleetError::Validation("licenseKey is required".to_string()));

        assert!(!runtime.exists("foundry-1").await);
    }

    #[tokio::test]
    async fn test_second_start_reports_already_running() {
        let (_runtime, manager) = manager();
        manager
            .start_instance(&request(0), Environment::Staging)
            .await
            .unwrap();

        let err = manager
            .start_instance(&request(0), Environment::Staging)
            .await
            .unwrap_err();
        assert_eq!(err, FleetError::AlreadyRunning("foundry-1".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_starts_have_one_winner() {
        let (_runtime, manager) = manager();
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    manager.start_instance(&request(2), Environment::Staging).await
                })
            })
            .collect();

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, FleetError::AlreadyRunning(_))),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_status_is_scoped_to_environment() {
        let (_runtime, manager) = manager();
        manager
            .start_instance(&request(0), Environment::Staging)
            .await
            .unwrap();

        let staging = manager
            .get_instance_status(Environment::Staging)
            .await
            .unwrap();
        assert_eq!(staging.len(), 1);
        assert_eq!(staging[0].name, "foundry-1");
        assert_eq!(staging[0].slot, 0);

        let production = manager
            .get_instance_status(Environment::Production)
            .await
            .unwrap();
        assert!(production.is_empty());
    }

    #[tokio::test]
    async fn test_status_drops_containers_outside_registry() {
        let (runtime, manager) = manager();
        runtime.seed_running("foundry-4", Some(30100)).await;
        runtime.seed_running("foundry-9", Some(30200)).await;
        runtime.seed_running("foundry-old", None).await;

        let staging = manager
            .get_instance_status(Environment::Staging)
            .await
            .unwrap();
        assert!(staging.is_empty());

        let production = manager
            .get_instance_status(Environment::Production)
            .await
            .unwrap();
        let names: Vec<_> = production.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["foundry-4"]);
    }

    #[tokio::test]
    async fn test_stop_never_started_is_ok() {
        let (_runtime, manager) = manager();
        manager
            .stop_instance("foundry-3", Environment::Staging)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_removes_container() {
        let (runtime, manager) = manager();
        manager
            .start_instance(&request(0), Environment::Production)
            .await
            .unwrap();
        manager
            .stop_instance("foundry-4", Environment::Production)
            .await
            .unwrap();

        assert!(!runtime.exists("foundry-4").await);
        manager
            .start_instance(&request(0), Environment::Production)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cross_environment_mutations_are_refused() {
        let (runtime, manager) = manager();
        manager
            .start_instance(&request(0), Environment::Staging)
            .await
            .unwrap();

        let expected = FleetError::Access {
            container: "foundry-1".to_string(),
            environment: Environment::Production,
        };
        assert_eq!(
            manager
                .stop_instance("foundry-1", Environment::Production)
                .await
                .unwrap_err(),
            expected
        );
        assert_eq!(
            manager
                .restart_instance("foundry-1", Environment::Production)
                .await
                .unwrap_err(),
            expected
        );
        assert_eq!(
            manager
                .get_instance_logs("foundry-1", Environment::Production, 10)
                .await
                .unwrap_err(),
            expected
        );
        assert!(runtime.exists("foundry-1").await);
    }

    #[tokio::test]
    async fn test_unknown_names() {
        let (_runtime, manager) = manager();
        let err = manager
            .stop_instance("foundry-42", Environment::Staging)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Access { .. }));

        let err = manager
            .stop_instance("nginx", Environment::Staging)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }

    #[tokio::test]
    async fn test_restart_keeps_identity() {
        let (runtime, manager) = manager();
        let started = manager
            .start_instance(&request(2), Environment::Production)
            .await
            .unwrap();
        manager
            .restart_instance("foundry-6", Environment::Production)
            .await
            .unwrap();

        let spec = runtime.spec_of("foundry-6").await.unwrap();
        assert_eq!(spec.host_port, started.port);
        let status = manager
            .get_instance_status(Environment::Production)
            .await
            .unwrap();
        assert_eq!(status[0].name, started.container_name);
    }

    #[tokio::test]
    async fn test_restart_missing_container() {
        let (_runtime, manager) = manager();
        let err = manager
            .restart_instance("foundry-2", Environment::Staging)
            .await
            .unwrap_err();
        assert_eq!(err, FleetError::NotFound("foundry-2".to_string()));
    }

    #[tokio::test]
    async fn test_logs_tail_bounds() {
        let (_runtime, manager) = manager();
        manager
            .start_instance(&request(0), Environment::Staging)
            .await
            .unwrap();

        for tail in [0, MAX_LOG_TAIL + 1] {
            let err = manager
                .get_instance_logs("foundry-1", Environment::Staging, tail)
                .await
                .unwrap_err();
            assert!(matches!(err, FleetError::Validation(_)));
        }

        let logs = manager
            .get_instance_logs("foundry-1", Environment::Staging, 50)
            .await
            .unwrap();
        assert!(logs.contains("foundry-1 started"));
    }

    #[tokio::test]
    async fn test_runtime_failure_surfaces_as_runtime_error() {
        let manager = InstanceManager::new(
            Arc::new(MockRuntime::failing()),
            InstanceManagerConfig::default(),
        );

        let err = manager
            .start_instance(&request(0), Environment::Staging)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Runtime(_)));

        let err = manager
            .get_instance_status(Environment::Staging)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Runtime(_)));
        assert!(manager.runtime_ready().await.is_err());
    }
}
