//! Error types for ytdl-relay
//!
//! This module provides error handling for the crate, including:
//! - Domain-specific error variants (resolution, download, external tool)
//! - HTTP status code mapping and response conversion for API integration
//! - Structured error responses with machine-readable error codes

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for ytdl-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ytdl-relay
///
/// This is the primary error type used throughout the crate. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_dir")
        key: Option<String>,
    },

    /// Malformed client request (e.g., an empty target URL)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Could not resolve a media id for the requested URL
    #[error("cannot resolve media id: {0}")]
    Resolve(String),

    /// The downloader process failed (non-zero exit, broken output)
    #[error("download error: {0}")]
    Download(String),

    /// External tool execution failed (yt-dlp missing, spawn error, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServer(String),
}

/// API error response format
///
/// Returned by API endpoints when an error occurs: a machine-readable code plus
/// a human-readable message.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "resolve_failed",
///     "message": "cannot resolve media id: yt-dlp exited with status 1"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "resolve_failed")
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::new(err.error_code(), err.to_string())
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - invalid input or configuration
            Error::Config { .. } => 400,
            Error::InvalidRequest(_) => 400,

            // 502 Bad Gateway - the upstream resolver could not produce an id
            Error::Resolve(_) => 502,

            // 500 Internal Server Error - everything else
            Error::Download(_) => 500,
            Error::ExternalTool(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServer(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "invalid_config",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Resolve(_) => "resolve_failed",
            Error::Download(_) => "download_failed",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Io(_) => "io_error",
            Error::ApiServer(_) => "api_server_error",
        }
    }
}

/// Errors convert straight into HTTP responses: the status from
/// [`ToHttpStatus`], the body a JSON [`ApiError`].
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ApiError::from(self))).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // bare ApiErrors carry no status; anything with one goes through Error
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_maps_to_bad_gateway() {
        let error = Error::Resolve("no id".to_string());
        assert_eq!(error.status_code(), 502);
        assert_eq!(error.error_code(), "resolve_failed");
    }

    #[test]
    fn test_config_error_maps_to_bad_request() {
        let error = Error::Config {
            message: "output_dir must not be empty".to_string(),
            key: Some("output_dir".to_string()),
        };
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), "invalid_config");
    }

    #[test]
    fn test_download_error_maps_to_internal() {
        let error = Error::Download("yt-dlp exited with status 1".to_string());
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.error_code(), "download_failed");
    }

    #[test]
    fn test_error_to_api_error_carries_message() {
        let error = Error::Resolve("yt-dlp exited with status 1".to_string());
        let api_error: ApiError = error.into();

        assert_eq!(api_error.error.code, "resolve_failed");
        assert!(api_error.error.message.contains("status 1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: Error = io.into();
        assert_eq!(error.error_code(), "io_error");
        assert!(error.to_string().contains("gone"));
    }

    #[test]
    fn test_invalid_request_maps_to_bad_request() {
        let error = Error::InvalidRequest("empty target url".to_string());
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_resolve_error_into_response() {
        let error = Error::Resolve("yt-dlp produced no id for x".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let api_error: ApiError = serde_json::from_slice(&body).unwrap();

        assert_eq!(api_error.error.code, "resolve_failed");
        assert!(api_error.error.message.contains("no id"));
    }

    #[tokio::test]
    async fn test_config_error_into_response() {
        let error = Error::Config {
            message: "output_dir must not be empty".to_string(),
            key: Some("download.output_dir".to_string()),
        };
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_error_into_response() {
        let error = Error::Download("yt-dlp exited with status 1".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let api_error: ApiError = serde_json::from_slice(&body).unwrap();
        assert_eq!(api_error.error.code, "download_failed");
    }
}
