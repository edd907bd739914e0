//! Docker Engine runtime implementation.
//!
//! This module provides the production runtime, implementing the `Runtime`
//! trait against the Docker Engine HTTP API on the local Unix socket.
//!
//! ## Components
//!
//! - `api`: HTTP client for the Engine API socket
//! - `logs`: demultiplexing of attached stdout/stderr log streams
//! - `runtime`: `Runtime` trait implementation
//!
//! ## Reference
//!
//! - Engine API: https://docs.docker.com/engine/api/v1.43/

mod api;
#[cfg(test)]
mod fake_engine;
mod logs;
mod runtime;

pub use api::{DockerApiError, DockerClient};
pub use logs::demultiplex;
pub use runtime::{DockerRuntime, DockerRuntimeConfig};
