//! # foundry-registry
//!
//! Deterministic mapping between deployment environments, slots, container
//! names and host ports for the Foundry game-server fleet.
//!
//! ## Layout
//!
//! Each environment owns a fixed number of slots. A slot maps to exactly one
//! container name and one host port:
//!
//! | Environment | Slots | Containers | Ports |
//! |---|---|---|---|
//! | staging | 0..3 | `foundry-1` .. `foundry-3` | 30000 .. 30002 |
//! | production | 0..3 | `foundry-4` .. `foundry-6` | 30100 .. 30102 |
//!
//! Nothing here is allocated or stored. Identity is computed from
//! `(environment, slot)` and inverted by parsing the container number, so the
//! container-number ranges are the whole tenancy boundary: a container belongs
//! to the environment whose range contains its number.

mod environment;
mod error;
mod naming;

pub use environment::Environment;
pub use error::RegistryError;
pub use naming::{
    container_name, environment_of, port, slot_of, validate_ownership, CONTAINER_PREFIX,
    SLOTS_PER_ENVIRONMENT,
};
