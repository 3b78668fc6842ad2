use crate::error::{IngestError, NormalizeError, StoreError};
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Errors a handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No PDF in the upload; send it as multipart field 'file'")]
    MissingFile,

    #[error("Expected application/pdf, got {0}")]
    UnsupportedMediaType(String),

    #[error("Upload is {size} bytes; the limit is {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Malformed multipart body: {}", .0.body_text())]
    Multipart(#[from] MultipartError),

    #[error("No patch list stored under '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Status code and machine-readable kind.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingFile => (StatusCode::BAD_REQUEST, "missing_file"),
            ApiError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type")
            }
            ApiError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            ApiError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            ApiError::Multipart(e) => (e.status(), "bad_multipart"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Ingest(e) => classify_ingest(e),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

fn classify_ingest(e: &IngestError) -> (StatusCode, &'static str) {
    match e {
        IngestError::Normalize(NormalizeError::Parse(_)) => (StatusCode::BAD_GATEWAY, "parse_error"),
        IngestError::Normalize(NormalizeError::Validation(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "validation_error")
        }
        IngestError::ProviderNotConfigured { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "provider_not_configured")
        }
        IngestError::LlmFailed { .. } => (StatusCode::BAD_GATEWAY, "llm_failed"),
        IngestError::ApiTimeout { .. } => (StatusCode::BAD_GATEWAY, "llm_timeout"),
        IngestError::NotAPdf { .. } => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type"),
        IngestError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
        IngestError::CorruptPdf { .. }
        | IngestError::PasswordRequired { .. }
        | IngestError::WrongPassword { .. }
        | IngestError::EmptyDocument { .. }
        | IngestError::RasterisationFailed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "pdf_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if status.is_server_error() {
            error!("{kind}: {self}");
        } else {
            warn!("{kind}: {self}");
        }

        let body = ErrorResponse {
            error: kind.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
