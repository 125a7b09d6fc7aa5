//! Common error types for the gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API name doesn't exist: {0}")]
    UnknownService(String),

    #[error("Configuration already exists for {service} at {url}")]
    AlreadyRegistered { service: String, url: String },

    #[error("Configuration does not exist for {service} at {url}")]
    NotRegistered { service: String, url: String },

    #[error("Could not find {url} for service {service}")]
    InstanceNotFound { service: String, url: String },

    #[error("Service {0} has no available instances")]
    NoAvailableInstance(String),

    #[error("Backend {url} is unreachable: {reason}")]
    BackendUnreachable { url: String, reason: String },

    #[error("Change applied but could not be persisted: {0}")]
    Persistence(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response format
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl AppError {
    /// Status code, error type and machine-readable code for the boundary
    fn classify(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                Some("invalid_json"),
            ),
            AppError::UnknownService(_) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                Some("unknown_service"),
            ),
            AppError::AlreadyRegistered { .. } => (
                StatusCode::CONFLICT,
                "registry_error",
                Some("already_registered"),
            ),
            AppError::NotRegistered { .. } => (
                StatusCode::NOT_FOUND,
                "registry_error",
                Some("not_registered"),
            ),
            AppError::InstanceNotFound { .. } => (
                StatusCode::NOT_FOUND,
                "registry_error",
                Some("instance_not_found"),
            ),
            AppError::NoAvailableInstance(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "server_error",
                Some("no_available_instance"),
            ),
            AppError::BackendUnreachable { .. } => (
                StatusCode::BAD_GATEWAY,
                "backend_error",
                Some("backend_unreachable"),
            ),
            AppError::Persistence(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                Some("persistence_failure"),
            ),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        }
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.classify();

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
