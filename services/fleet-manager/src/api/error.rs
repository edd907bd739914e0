use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::FleetError;

/// Generic message for 5xx responses outside development mode.
const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub request_id: String,
}

impl ErrorBody {
    fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
            request_id: "unknown".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Box<ErrorBody>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: Box::new(ErrorBody::new(code, message)),
        }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn too_many_requests(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::TOO_MANY_REQUESTS, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.body.request_id = request_id.into();
        self
    }

    /// Map a domain error. Internal messages are passed through only when
    /// `expose_internal` is set.
    pub fn from_fleet(err: FleetError, expose_internal: bool) -> Self {
        let internal_message = |message: String| {
            if expose_internal {
                message
            } else {
                INTERNAL_MESSAGE.to_string()
            }
        };

        match err {
            FleetError::Validation(message) => Self::bad_request("validation_error", message),
            FleetError::Unauthenticated(message) => Self::unauthorized("unauthenticated", message),
            err @ FleetError::Access { .. } => Self::forbidden("access_denied", err.to_string()),
            err @ FleetError::NotFound(_) => Self::not_found("not_found", err.to_string()),
            err @ FleetError::AlreadyRunning(_) => Self::conflict("already_running", err.to_string()),
            FleetError::ServerMisconfigured(message) => {
                Self::internal("server_misconfigured", internal_message(message))
            }
            err @ FleetError::Runtime(_) => {
                Self::internal("runtime_error", internal_message(err.to_string()))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
