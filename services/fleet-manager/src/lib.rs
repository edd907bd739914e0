//! Foundry fleet manager library.
//!
//! This crate primarily ships a `fleet-manager` binary, but we expose the
//! library surface for integration testing and reuse.
//!
//! Layers, bottom up:
//! - [`runtime`]: the container backend trait, with [`docker`] and an
//!   in-memory mock behind it
//! - [`instance`]: environment-scoped lifecycle operations
//! - [`api`]: HTTP routes, authentication, audit and rate limiting

pub mod api;
pub mod config;
pub mod docker;
pub mod error;
pub mod instance;
pub mod runtime;
pub mod state;

pub use error::FleetError;
pub use instance::{InstanceManager, InstanceManagerConfig, InstanceRequest};
pub use runtime::{MockRuntime, Runtime, RuntimeError};
pub use state::{ApiSettings, AppState};
