use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::core::types::ErrorResponse;

/// Crate-wide error taxonomy. Each variant names the component that raised it
/// so the propagation policy (degrade vs. fail) can dispatch on it uniformly.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),

    #[error("extraction failed for {filename}: {reason}")]
    ExtractionFailed { filename: String, reason: String },

    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("upsert failed after retries: {0}")]
    UpsertFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("classification failed: {0}")]
    ClassificationFailed(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("model timed out after {0:?}")]
    ModelTimeout(std::time::Duration),

    #[error("operation canceled")]
    Canceled,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CoreError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::DecodeFailed(_) | CoreError::ParseFailed(_) => StatusCode::BAD_REQUEST,
            CoreError::ExtractionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::UpsertFailed(_) | CoreError::QueryFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CoreError::ClassificationFailed(_) => StatusCode::OK, // degrades, never surfaced
            CoreError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::ModelTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Canceled => StatusCode::OK, // silent no-op, never surfaced
            CoreError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        tracing::error!(error = %self, status = %status, "request failed");
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
