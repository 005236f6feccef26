use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Only `BadRequest` and `Processing` are produced while serving a request.
/// The remaining variants come from startup and configuration paths and are
/// mapped to process exit codes by the binaries.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Processing(String),

    #[error("Failed to connect to log broker: {0}")]
    ConnectionFailed(String),

    #[error("Topic operation failed: {0}")]
    TopicError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::BadRequest(msg) => {
                tracing::warn!(error = %self, "Request rejected");
                (StatusCode::BAD_REQUEST, "bad_request", msg.clone())
            }
            // Encode and publish failures keep the underlying description so
            // the caller can decide whether to retry.
            AppError::Processing(msg) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "processing_error",
                    msg.clone(),
                )
            }
            AppError::ConnectionFailed(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "connection_failed",
                    "Message broker is temporarily unavailable. Please try again later."
                        .to_string(),
                )
            }
            AppError::TopicError(_) | AppError::ConfigError(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred. Please contact support if the issue persists."
                        .to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

/// Failures of the order command codec.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("error while marshaling order command: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("error while unmarshaling order command: {0}")]
    Decoding(#[source] serde_json::Error),
}

/// Failures of `LogWriter::publish`.
///
/// `Unavailable` and `Timeout` are transient: the identical key and value may
/// be published again. The other variants will fail the same way every time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("log broker unavailable: {0}")]
    Unavailable(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("log writer is closed")]
    Closed,
}

impl PublishError {
    /// Whether retrying the identical publish can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Unavailable(_) | PublishError::Timeout(_))
    }
}

/// Failures of `LogReader::next` and `LogReader::commit`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("log broker unavailable: {0}")]
    Unavailable(String),

    #[error("failed to commit offset {offset} on partition {partition}: {reason}")]
    Commit {
        partition: u32,
        offset: u64,
        reason: String,
    },

    #[error("log reader is closed")]
    Closed,
}

/// Failure reported by a downstream command processor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProcessError(pub String);

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
///
/// Serde errors can contain internal struct/field names which shouldn't be
/// exposed to external clients. This function extracts the useful parts.
pub fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("missing field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("Missing required field: {field}");
    }

    if msg.contains("unknown field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("Unknown field: {field}");
    }

    if msg.contains("invalid type") || msg.contains("invalid value") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("EOF while parsing") || msg.contains("expected") {
        return "Malformed JSON in request body".to_string();
    }

    "Invalid request format".to_string()
}
