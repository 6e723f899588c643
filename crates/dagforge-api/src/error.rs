//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dagforge_core::{DeploymentFailures, Error};
use serde_json::json;
use std::sync::Arc;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// The request was understood but the project's specs cannot be
    /// resolved, compiled or stored.
    Unprocessable(String),
    Deployment(DeploymentFailures),
    BadGateway(String),
    Timeout(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Deployment(failures) => {
                let body = Json(json!({
                    "error": failures.to_string(),
                    "project": failures.project,
                    "written": failures.written,
                    "failures": failures.failures,
                }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            Error::Conflict(msg) => ApiError::Conflict(msg.clone()),
            Error::MissingDependency { .. }
            | Error::CyclicDependency { .. }
            | Error::Compilation { .. }
            | Error::StorageConfig { .. } => ApiError::Unprocessable(err.to_string()),
            Error::Deployment(failures) => ApiError::Deployment(failures.clone()),
            Error::Bootstrap { .. } | Error::Storage(_) => ApiError::BadGateway(err.to_string()),
            Error::Timeout(msg) => ApiError::Timeout(msg.clone()),
            Error::Cancelled => ApiError::Unavailable(err.to_string()),
            Error::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::from(&err)
    }
}

impl From<Arc<Error>> for ApiError {
    fn from(err: Arc<Error>) -> Self {
        ApiError::from(err.as_ref())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
