//! Health check endpoints.
//!
//! Open to unauthenticated callers; still audited and rate limited.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

const SERVICE_NAME: &str = "fleet-manager";

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// "ok" or "unavailable".
    pub status: String,

    pub service: String,

    pub version: String,

    /// Current timestamp (RFC 3339).
    pub timestamp: String,

    /// Container runtime status, reported by `/readyz` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

impl HealthResponse {
    fn new(status: &str, runtime: Option<String>) -> Self {
        Self {
            status: status.to_string(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
            runtime,
        }
    }
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
}

/// Liveness: the process is serving. Dependencies are not checked.
async fn health() -> impl IntoResponse {
    Json(HealthResponse::new("ok", None))
}

/// Readiness: the container runtime answers a ping. 503 otherwise.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.manager().runtime_ready().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse::new("ok", Some("ok".to_string()))),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Container runtime not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::new("unavailable", Some("unavailable".to_string()))),
            )
        }
    }
}
