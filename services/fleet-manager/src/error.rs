//! Domain error taxonomy.

use foundry_registry::{Environment, RegistryError};
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors from fleet operations and request authentication.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FleetError {
    /// Malformed or out-of-range client input.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credential.
    #[error("{0}")]
    Unauthenticated(String),

    /// A container outside the caller's environment was addressed.
    #[error("container '{container}' does not belong to the {environment} environment")]
    Access {
        container: String,
        environment: Environment,
    },

    /// Operator fault, e.g. no secret configured for an environment.
    #[error("{0}")]
    ServerMisconfigured(String),

    /// The target container is already running.
    #[error("container '{0}' is already running")]
    AlreadyRunning(String),

    /// The target container does not exist.
    #[error("container '{0}' not found")]
    NotFound(String),

    /// Container runtime failure.
    #[error("container runtime error: {0}")]
    Runtime(String),
}

impl From<RegistryError> for FleetError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::OwnershipMismatch { name, claimed, .. } => FleetError::Access {
                container: name,
                environment: claimed,
            },
            // UnknownContainer needs the claimed environment; see `for_environment`.
            other => FleetError::Validation(other.to_string()),
        }
    }
}

impl From<RuntimeError> for FleetError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::AlreadyRunning(name) => FleetError::AlreadyRunning(name),
            RuntimeError::NotFound(name) => FleetError::NotFound(name),
            RuntimeError::Runtime(message) => FleetError::Runtime(message),
        }
    }
}

impl FleetError {
    /// Map a registry failure for a request scoped to `env`.
    ///
    /// A container number outside every range is reported as an access
    /// error: whatever it names, it is not the caller's.
    pub fn for_environment(err: RegistryError, env: Environment) -> Self {
        match err {
            RegistryError::UnknownContainer { name, .. } => FleetError::Access {
                container: name,
                environment: env,
            },
            other => other.into(),
        }
    }
}
