//! Consistent response envelope for all v2 API endpoints.
//!
//! Success bodies are `{ "data": T, "meta": { ... } }`, errors are
//! `{ "error": { "code", "message" }, "meta": { ... } }`. Telemetry responses
//! also carry the connection state in `meta` so a client can always tell
//! simulated data from device data.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use crate::config::SettingsError;
use crate::pipeline::SchedulerError;
use crate::types::ConnectionState;

/// Metadata included in every v2 response.
#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo: Option<bool>,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: "2",
            connection: None,
            demo: None,
        }
    }
}

impl ResponseMeta {
    fn for_state(state: ConnectionState) -> Self {
        Self {
            connection: Some(state),
            demo: Some(state == ConnectionState::Demo),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    fn respond(status: StatusCode, data: T, meta: ResponseMeta) -> Response {
        (status, axum::Json(Self { data, meta })).into_response()
    }

    pub fn ok(data: T) -> Response {
        Self::respond(StatusCode::OK, data, ResponseMeta::default())
    }

    /// 200 with the connection state stamped into `meta`.
    pub fn telemetry(data: T, state: ConnectionState) -> Response {
        Self::respond(StatusCode::OK, data, ResponseMeta::for_state(state))
    }

    /// 202 for commands queued on the scheduler.
    pub fn accepted(data: T) -> Response {
        Self::respond(StatusCode::ACCEPTED, data, ResponseMeta::default())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    fn build(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Response {
        let body = Self {
            error: ErrorDetail {
                code,
                message: msg.into(),
            },
            meta: ResponseMeta::default(),
        };
        (status, axum::Json(body)).into_response()
    }

    pub fn bad_request(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
    }
}

/// Handler error mapped onto the error envelope.
#[derive(Debug)]
pub enum ApiError {
    Scheduler(SchedulerError),
    Settings(SettingsError),
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Scheduler(SchedulerError::Stopped) => {
                ApiErrorResponse::service_unavailable("acquisition is not running")
            }
            Self::Scheduler(e) => ApiErrorResponse::bad_request(e.to_string()),
            Self::Settings(
                e @ (SettingsError::InvalidInterval(_) | SettingsError::InvalidAddress(_)),
            ) => ApiErrorResponse::bad_request(e.to_string()),
            Self::Settings(e) => {
                tracing::error!(error = %e, "Failed to persist device settings");
                ApiErrorResponse::internal(format!("failed to save settings: {e}"))
            }
        }
    }
}
