//! Request-scoped context extracted from HTTP requests.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use foundry_registry::Environment;

use crate::api::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const ENVIRONMENT_HEADER: &str = "x-environment";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Environment validated by the auth middleware, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedEnvironment(pub Environment);

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub environment: Environment,
}

pub(crate) fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Request ID assigned by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> String {
    header_string(headers, REQUEST_ID_HEADER).unwrap_or_else(|| "unknown".to_string())
}

/// Caller IP: the first `X-Forwarded-For` hop when trusted, else the peer
/// address of the connection.
pub fn caller_ip(request: &Request, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = header_string(request.headers(), FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next().and_then(|ip| ip.trim().parse().ok()));
        if forwarded.is_some() {
            return forwarded;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = request_id(&parts.headers);

        // Only the auth middleware inserts this. Handlers mounted without it
        // are a wiring bug, not a client error.
        let Some(AuthenticatedEnvironment(environment)) =
            parts.extensions.get::<AuthenticatedEnvironment>().copied()
        else {
            tracing::error!(request_id = %request_id, "Route reached without authentication");
            return Err(ApiError::internal(
                "server_misconfigured",
                "Request was not authenticated",
            )
            .with_request_id(request_id));
        };

        Ok(Self {
            request_id,
            environment,
        })
    }
}
