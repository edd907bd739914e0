//! Error types for registry lookups and ownership checks.

use thiserror::Error;

use crate::Environment;

/// Errors produced by the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The slot is outside `0..SLOTS_PER_ENVIRONMENT`.
    #[error("slot {slot} is out of range (expected 0..{max})")]
    SlotOutOfRange { slot: i64, max: i64 },

    /// The container name is not of the form `foundry-<N>`.
    #[error("invalid container name '{0}': expected 'foundry-<N>'")]
    InvalidContainerName(String),

    /// The container number is not inside any environment's range.
    #[error("container '{name}' (number {number}) is outside every environment range")]
    UnknownContainer { name: String, number: u32 },

    /// The container belongs to a different environment than the one claimed.
    #[error("container '{name}' belongs to {actual}, not {claimed}")]
    OwnershipMismatch {
        name: String,
        claimed: Environment,
        actual: Environment,
    },

    /// The environment label is not recognised.
    #[error("unknown environment '{0}': expected 'staging' or 'production'")]
    UnknownEnvironment(String),
}

impl RegistryError {
    /// Returns true for range failures (slot or container number).
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            RegistryError::SlotOutOfRange { .. } | RegistryError::UnknownContainer { .. }
        )
    }

    /// Returns true for malformed input.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            RegistryError::InvalidContainerName(_) | RegistryError::UnknownEnvironment(_)
        )
    }

    /// Returns true when a container was claimed under the wrong environment.
    pub fn is_access_error(&self) -> bool {
        matches!(self, RegistryError::OwnershipMismatch { .. })
    }
}
