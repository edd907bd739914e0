//! Instance API endpoints.
//!
//! Mounted under `/api/instances` behind the auth middleware. The environment
//! always comes from [`RequestContext`], never from the request body.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use foundry_registry::Environment;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::error::FleetError;
use crate::instance::{InstanceRequest, RunningInstance};
use crate::state::AppState;

/// Default number of log lines returned by the logs endpoint.
pub const DEFAULT_LOG_TAIL: u32 = 100;

/// Create instance routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_instance))
        .route("/stop", post(stop_instance))
        .route("/status", post(instance_status))
        .route("/restart", post(restart_instance))
        .route("/logs/{container_name}", get(instance_logs))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstanceRequest {
    pub world_id: Option<String>,
    pub owner_id: Option<String>,
    pub slot: Option<i64>,
    pub license_key: Option<String>,
}

/// Body of stop and restart.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRequest {
    pub container_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstanceResponse {
    pub success: bool,
    pub container_name: String,
    pub environment: Environment,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub environment: Environment,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: Vec<RunningInstance>,
    pub environment: Environment,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: String,
    pub environment: Environment,
}

// =============================================================================
// Handlers
// =============================================================================

fn api_error(state: &AppState, ctx: &RequestContext, err: FleetError) -> ApiError {
    ApiError::from_fleet(err, state.expose_internal_errors()).with_request_id(ctx.request_id.clone())
}

fn invalid_body(ctx: &RequestContext, message: impl Into<String>) -> ApiError {
    ApiError::bad_request("validation_error", message).with_request_id(ctx.request_id.clone())
}

fn required<T>(ctx: &RequestContext, value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| invalid_body(ctx, format!("{field} is required")))
}

/// Start the caller's instance in the requested slot.
///
/// POST /api/instances/start
async fn start_instance(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<StartInstanceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| invalid_body(&ctx, e.body_text()))?;

    let request = InstanceRequest {
        world_id: required(&ctx, body.world_id, "worldId")?,
        owner_id: required(&ctx, body.owner_id, "ownerId")?,
        slot: required(&ctx, body.slot, "slot")?,
        license_key: required(&ctx, body.license_key, "licenseKey")?,
    };

    let config = state
        .manager()
        .start_instance(&request, ctx.environment)
        .await
        .map_err(|e| api_error(&state, &ctx, e))?;

    Ok(Json(StartInstanceResponse {
        success: true,
        container_name: config.container_name,
        environment: config.environment,
        port: config.port,
    }))
}

/// Stop and remove one of the caller's containers.
///
/// POST /api/instances/stop
async fn stop_instance(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<ContainerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| invalid_body(&ctx, e.body_text()))?;
    let container_name = required(&ctx, body.container_name, "containerName")?;

    state
        .manager()
        .stop_instance(&container_name, ctx.environment)
        .await
        .map_err(|e| api_error(&state, &ctx, e))?;

    Ok(Json(ActionResponse {
        success: true,
        environment: ctx.environment,
    }))
}

/// List the caller's running instances.
///
/// POST /api/instances/status
async fn instance_status(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let running = state
        .manager()
        .get_instance_status(ctx.environment)
        .await
        .map_err(|e| api_error(&state, &ctx, e))?;

    Ok(Json(StatusResponse {
        running,
        environment: ctx.environment,
    }))
}

/// Restart one of the caller's containers in place.
///
/// POST /api/instances/restart
async fn restart_instance(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<ContainerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| invalid_body(&ctx, e.body_text()))?;
    let container_name = required(&ctx, body.container_name, "containerName")?;

    state
        .manager()
        .restart_instance(&container_name, ctx.environment)
        .await
        .map_err(|e| api_error(&state, &ctx, e))?;

    Ok(Json(ActionResponse {
        success: true,
        environment: ctx.environment,
    }))
}

/// Tail the logs of one of the caller's containers.
///
/// GET /api/instances/logs/{container_name}?tail=N
async fn instance_logs(
    State(state): State<AppState>,
    ctx: RequestContext,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(container_name) = path.map_err(|e| invalid_body(&ctx, e.body_text()))?;
    let Query(query) = query.map_err(|e| invalid_body(&ctx, e.body_text()))?;
    let tail = query.tail.unwrap_or(DEFAULT_LOG_TAIL);

    let logs = state
        .manager()
        .get_instance_logs(&container_name, ctx.environment, tail)
        .await
        .map_err(|e| api_error(&state, &ctx, e))?;

    Ok(Json(LogsResponse {
        logs,
        environment: ctx.environment,
    }))
}
