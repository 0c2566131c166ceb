//! API error type with structured JSON responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ingest::reassemble::MergeError;
use crate::repository::{DbError, DocumentWriteError};
use crate::services::ImageStoreError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payload too large")]
    PayloadTooLarge,
    #[error("Upstream failure: {0}")]
    BadGateway(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn document_not_found() -> Self {
        ApiError::NotFound("document not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "Request body exceeds the configured size limit".to_string(),
            ),
            ApiError::BadGateway(detail) => {
                tracing::warn!(detail = %detail, "Upstream service failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM",
                    "The image store could not be reached".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<DocumentWriteError> for ApiError {
    fn from(err: DocumentWriteError) -> Self {
        match err {
            DocumentWriteError::NotFound => ApiError::document_not_found(),
            DocumentWriteError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            DocumentWriteError::Invalid(e) => e.into(),
            DocumentWriteError::Database(e) => e.into(),
        }
    }
}

impl From<ImageStoreError> for ApiError {
    fn from(err: ImageStoreError) -> Self {
        match err {
            ImageStoreError::InvalidInput(detail) => ApiError::BadRequest(detail),
            ImageStoreError::Fetch(_) | ImageStoreError::Upload(_) => {
                ApiError::BadGateway(err.to_string())
            }
            ImageStoreError::NotConfigured(_) | ImageStoreError::Io(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}
