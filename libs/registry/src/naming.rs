//! Container naming, port derivation and ownership validation.

use crate::{Environment, RegistryError};

/// Number of concurrently allocatable instances per environment.
pub const SLOTS_PER_ENVIRONMENT: i64 = 3;

/// Prefix shared by every fleet container name.
pub const CONTAINER_PREFIX: &str = "foundry-";

fn check_slot(slot: i64) -> Result<u32, RegistryError> {
    if !(0..SLOTS_PER_ENVIRONMENT).contains(&slot) {
        return Err(RegistryError::SlotOutOfRange {
            slot,
            max: SLOTS_PER_ENVIRONMENT,
        });
    }
    Ok(slot as u32)
}

/// Container name for `slot` in `env`, e.g. `foundry-4` for production slot 0.
pub fn container_name(env: Environment, slot: i64) -> Result<String, RegistryError> {
    let slot = check_slot(slot)?;
    let number = env.container_offset() + slot + 1;
    Ok(format!("{CONTAINER_PREFIX}{number}"))
}

/// Host port for `slot` in `env`.
pub fn port(env: Environment, slot: i64) -> Result<u16, RegistryError> {
    let slot = check_slot(slot)?;
    Ok(env.base_port() + slot as u16)
}

/// Parse the container number out of `foundry-<N>`.
///
/// Only the canonical spelling is accepted: ASCII digits, no sign and no
/// leading zero. `foundry-01` would otherwise alias `foundry-1` while naming a
/// container the runtime has never heard of.
fn container_number(name: &str) -> Result<u32, RegistryError> {
    let invalid = || RegistryError::InvalidContainerName(name.to_string());

    let digits = name.strip_prefix(CONTAINER_PREFIX).ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(invalid());
    }

    digits.parse::<u32>().map_err(|_| invalid())
}

/// Environment that owns the container `name`.
pub fn environment_of(name: &str) -> Result<Environment, RegistryError> {
    let number = container_number(name)?;
    Environment::ALL
        .into_iter()
        .find(|env| env.owns_number(number))
        .ok_or_else(|| RegistryError::UnknownContainer {
            name: name.to_string(),
            number,
        })
}

/// Slot of `name` within `env`. Inverse of [`container_name`].
pub fn slot_of(name: &str, env: Environment) -> Result<i64, RegistryError> {
    validate_ownership(name, env)?;
    let number = container_number(name)?;
    Ok(i64::from(number - env.container_offset() - 1))
}

/// Fails unless `name` belongs to `env`.
///
/// Must run before any mutating runtime call on behalf of a caller
/// authenticated for `env`.
pub fn validate_ownership(name: &str, env: Environment) -> Result<(), RegistryError> {
    let actual = environment_of(name)?;
    if actual != env {
        return Err(RegistryError::OwnershipMismatch {
            name: name.to_string(),
            claimed: env,
            actual,
        });
    }
    Ok(())
}
