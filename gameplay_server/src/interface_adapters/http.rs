// Shared HTTP response types for consistent API error payloads.

use crate::use_cases::RegistryError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    // Human-readable error string for consistent JSON error responses.
    pub error: String,
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Maps registry failures onto the HTTP status the API reports them with.
pub fn registry_error_response(error: &RegistryError) -> Response {
    let status = match error {
        RegistryError::NotFound => StatusCode::NOT_FOUND,
        RegistryError::AlreadyExists | RegistryError::Pinned => StatusCode::CONFLICT,
        RegistryError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, error.to_string())
}
