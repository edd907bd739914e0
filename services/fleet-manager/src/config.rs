//! Process configuration loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use foundry_registry::Environment;

use crate::api::rate_limit::RateLimitConfig;

/// Which container backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeBackend {
    /// Docker Engine API over its Unix socket.
    Docker,
    /// In-memory runtime; nothing is actually started.
    Mock,
}

/// Bearer secrets, exactly one per environment.
#[derive(Clone, Default)]
pub struct EnvironmentSecrets {
    staging: Option<String>,
    production: Option<String>,
}

impl EnvironmentSecrets {
    /// Empty secrets are treated as unset.
    pub fn new(staging: Option<String>, production: Option<String>) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
        Self {
            staging: non_empty(staging),
            production: non_empty(production),
        }
    }

    pub fn get(&self, env: Environment) -> Option<&str> {
        match env {
            Environment::Staging => self.staging.as_deref(),
            Environment::Production => self.production.as_deref(),
        }
    }
}

impl std::fmt::Debug for EnvironmentSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentSecrets")
            .field("staging", &self.staging.as_ref().map(|_| "<set>"))
            .field("production", &self.production.as_ref().map(|_| "<set>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    /// Development mode: internal error messages are returned to callers.
    pub dev_mode: bool,
    pub secrets: EnvironmentSecrets,
    pub runtime: RuntimeBackend,
    pub docker_socket: PathBuf,
    pub image: String,
    pub container_port: u16,
    pub stop_timeout_secs: u64,
    pub rate_limit: RateLimitConfig,
    /// Take the caller IP from `X-Forwarded-For` (behind a trusted proxy).
    pub trust_forwarded_for: bool,
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_var<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parse_var(
            "FLEET_LISTEN_ADDR",
            var("FLEET_LISTEN_ADDR"),
            SocketAddr::from(([127, 0, 0, 1], 8090)),
        )?;

        let log_level = var("FLEET_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let dev_mode = var("FLEET_DEV").map(|v| parse_bool(&v)).unwrap_or(false);

        let secrets = EnvironmentSecrets::new(
            var("FLEET_SECRET_STAGING"),
            var("FLEET_SECRET_PRODUCTION"),
        );

        let runtime = match var("FLEET_RUNTIME").as_deref() {
            None | Some("docker") => RuntimeBackend::Docker,
            Some("mock") => RuntimeBackend::Mock,
            Some(other) => bail!("invalid value for FLEET_RUNTIME: '{other}' (expected docker or mock)"),
        };

        let docker_socket = var("FLEET_DOCKER_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/var/run/docker.sock"));

        let image = var("FLEET_IMAGE").unwrap_or_else(|| "felddy/foundryvtt:release".to_string());

        let container_port = parse_var("FLEET_CONTAINER_PORT", var("FLEET_CONTAINER_PORT"), 30000u16)?;
        let stop_timeout_secs =
            parse_var("FLEET_STOP_TIMEOUT_SECS", var("FLEET_STOP_TIMEOUT_SECS"), 10u64)?;

        let defaults = RateLimitConfig::default();
        let max_requests = parse_var(
            "FLEET_RATE_LIMIT_MAX",
            var("FLEET_RATE_LIMIT_MAX"),
            defaults.max_requests,
        )?;
        let window_secs = parse_var(
            "FLEET_RATE_LIMIT_WINDOW_SECS",
            var("FLEET_RATE_LIMIT_WINDOW_SECS"),
            defaults.window.as_secs(),
        )?;
        if max_requests == 0 || window_secs == 0 {
            bail!("FLEET_RATE_LIMIT_MAX and FLEET_RATE_LIMIT_WINDOW_SECS must be positive");
        }

        let trust_forwarded_for = var("FLEET_TRUST_FORWARDED_FOR")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            secrets,
            runtime,
            docker_socket,
            image,
            container_port,
            stop_timeout_secs,
            rate_limit: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            trust_forwarded_for,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8090");
        assert_eq!(config.runtime, RuntimeBackend::Docker);
        assert_eq!(config.container_port, 30000);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(15 * 60));
        assert!(!config.dev_mode);
        assert!(config.secrets.get(Environment::Staging).is_none());
    }

    #[test]
    fn test_secrets_are_per_environment() {
        let config = config_from(&[
            ("FLEET_SECRET_STAGING", "s3cret"),
            ("FLEET_SECRET_PRODUCTION", ""),
        ])
        .unwrap();
        assert_eq!(config.secrets.get(Environment::Staging), Some("s3cret"));
        assert_eq!(config.secrets.get(Environment::Production), None);
        assert!(!format!("{:?}", config.secrets).contains("s3cret"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("FLEET_LISTEN_ADDR", "0.0.0.0:9000"),
            ("FLEET_DEV", "true"),
            ("FLEET_RUNTIME", "mock"),
            ("FLEET_RATE_LIMIT_MAX", "5"),
            ("FLEET_RATE_LIMIT_WINDOW_SECS", "60"),
            ("FLEET_TRUST_FORWARDED_FOR", "1"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert!(config.dev_mode);
        assert_eq!(config.runtime, RuntimeBackend::Mock);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert!(config.trust_forwarded_for);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("FLEET_RUNTIME", "podman")]).is_err());
        assert!(config_from(&[("FLEET_CONTAINER_PORT", "70000")]).is_err());
        assert!(config_from(&[("FLEET_RATE_LIMIT_MAX", "0")]).is_err());
        assert!(config_from(&[("FLEET_LISTEN_ADDR", "localhost")]).is_err());
    }
}
