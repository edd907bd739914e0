//! HTTP API handlers and routing.

pub mod audit;
pub mod auth;
pub mod error;
mod health;
mod instances;
pub mod rate_limit;
pub mod request_context;

use axum::{middleware, Router};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub use instances::DEFAULT_LOG_TAIL;

/// Create the main API router with all routes and middleware.
///
/// Request flow: request id, tracing, audit, rate limit, routing, then
/// authentication on the instance routes only.
pub fn create_router(state: AppState) -> Router {
    let instance_routes = instances::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::authenticate,
    ));

    Router::new()
        // Health endpoints (no auth required)
        .merge(health::routes())
        .nest("/api/instances", instance_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), audit::record))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
