//! HTTP error mapping

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use camera_capture::DecodeError;
use pipeline::PipelineError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Every failure a handler can return, one status each
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidPayload(String),

    #[error("Request body exceeds the upload limit")]
    PayloadTooLarge,

    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("Missing or invalid session token")]
    Unauthorized,

    #[error("No face found in image")]
    NoFace,

    #[error("{0}")]
    StorageUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) | ApiError::NoFace => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Decode(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code in the error body
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "invalid_payload",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::Decode(_) => "decode_error",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NoFace => "no_face",
            ApiError::StorageUnavailable(_) => "storage_unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::InvalidPayload(rejection.body_text())
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Decode(e) => ApiError::Decode(e),
            PipelineError::NoFace => ApiError::NoFace,
            PipelineError::Identity(e) => ApiError::Internal(e.to_string()),
            PipelineError::Storage(e) => ApiError::StorageUnavailable(e.to_string()),
            PipelineError::Task(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        } else {
            warn!(code = self.code(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
