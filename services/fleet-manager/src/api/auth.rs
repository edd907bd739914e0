//! Per-environment bearer authentication.
//!
//! A caller names its environment in `X-Environment` and proves it with that
//! environment's secret. The validated environment is attached to the request
//! for handlers; nothing in the request body can change it.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use foundry_registry::Environment;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::request_context::{
    header_string, request_id, AuthenticatedEnvironment, ENVIRONMENT_HEADER,
};
use crate::config::EnvironmentSecrets;
use crate::error::FleetError;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_string(headers, AUTHORIZATION.as_str())?;
    let token = value.trim().strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Compare digests so the comparison does not short-circuit on the secret.
fn token_matches(token: &str, secret: &str) -> bool {
    Sha256::digest(token.as_bytes()) == Sha256::digest(secret.as_bytes())
}

/// Resolve the caller's environment from request headers.
///
/// Checks run in a fixed order: environment header (400), configured secret
/// (500), bearer token (401).
pub fn authenticate_headers(
    headers: &HeaderMap,
    secrets: &EnvironmentSecrets,
) -> Result<Environment, FleetError> {
    let environment = header_string(headers, ENVIRONMENT_HEADER)
        .ok_or_else(|| FleetError::Validation("X-Environment header is required".to_string()))?
        .parse::<Environment>()
        .map_err(|_| {
            FleetError::Validation(
                "X-Environment must be 'staging' or 'production'".to_string(),
            )
        })?;

    let secret = secrets.get(environment).ok_or_else(|| {
        FleetError::ServerMisconfigured(format!("no API secret configured for {environment}"))
    })?;

    let token = bearer_token(headers).ok_or_else(|| {
        FleetError::Unauthenticated("missing or malformed bearer token".to_string())
    })?;
    if !token_matches(&token, secret) {
        return Err(FleetError::Unauthenticated("invalid credentials".to_string()));
    }

    Ok(environment)
}

/// Middleware guarding the instance routes.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    match authenticate_headers(request.headers(), state.secrets()) {
        Ok(environment) => {
            request
                .extensions_mut()
                .insert(AuthenticatedEnvironment(environment));
            next.run(request).await
        }
        Err(err) => {
            let request_id = request_id(request.headers());
            match &err {
                FleetError::ServerMisconfigured(_) => {
                    tracing::error!(request_id = %request_id, error = %err, "Authentication misconfigured")
                }
                _ => warn!(
                    request_id = %request_id,
                    path = %request.uri().path(),
                    error = %err,
                    "Authentication failed"
                ),
            }
            ApiError::from_fleet(err, state.expose_internal_errors())
                .with_request_id(request_id)
                .into_response()
        }
    }
}
