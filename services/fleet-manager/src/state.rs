//! Application state shared across request handlers.

use std::sync::Arc;

use crate::api::audit::{AuditSink, TracingAuditSink};
use crate::api::rate_limit::{RateLimitConfig, RateLimiter};
use crate::config::{Config, EnvironmentSecrets};
use crate::instance::InstanceManager;

/// HTTP-facing settings that are not part of the instance manager.
#[derive(Debug, Clone, Default)]
pub struct ApiSettings {
    pub secrets: EnvironmentSecrets,
    pub rate_limit: RateLimitConfig,
    /// Return internal error messages to callers (development only).
    pub expose_internal_errors: bool,
    pub trust_forwarded_for: bool,
}

impl From<&Config> for ApiSettings {
    fn from(config: &Config) -> Self {
        Self {
            secrets: config.secrets.clone(),
            rate_limit: config.rate_limit,
            expose_internal_errors: config.dev_mode,
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }
}

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    manager: InstanceManager,
    settings: ApiSettings,
    rate_limiter: RateLimiter,
    audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// Create a new application state auditing to the `audit` tracing target.
    pub fn new(manager: InstanceManager, settings: ApiSettings) -> Self {
        Self::with_audit_sink(manager, settings, Arc::new(TracingAuditSink))
    }

    pub fn with_audit_sink(
        manager: InstanceManager,
        settings: ApiSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(settings.rate_limit);
        Self {
            inner: Arc::new(AppStateInner {
                manager,
                settings,
                rate_limiter,
                audit,
            }),
        }
    }

    pub fn manager(&self) -> &InstanceManager {
        &self.inner.manager
    }

    pub fn secrets(&self) -> &EnvironmentSecrets {
        &self.inner.settings.secrets
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    pub fn audit(&self) -> &dyn AuditSink {
        self.inner.audit.as_ref()
    }

    pub fn expose_internal_errors(&self) -> bool {
        self.inner.settings.expose_internal_errors
    }

    pub fn trust_forwarded_for(&self) -> bool {
        self.inner.settings.trust_forwarded_for
    }
}
