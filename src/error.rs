//! Relay error types.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error taxonomy, mapped to HTTP status codes where an error can
/// reach a client.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Missing or invalid credentials or configuration at startup. Fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed request body or query. Carries every violation at once.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The native notifier call failed.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Asset download or caching failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A JSON-backed store could not be read, parsed or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The client must provide credentials.
    #[error("Authentication required")]
    Unauthorized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::Dispatch(_) | Self::Cache(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Configuration(_) | Self::Persistence(_) | Self::Io(_) | Self::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({ "error": true, "message": self.to_string() });

        if matches!(self, Self::Unauthorized) {
            (
                status,
                [(
                    header::WWW_AUTHENTICATE,
                    "Basic realm=\"notify-relay dashboard\"",
                )],
                axum::Json(body),
            )
                .into_response()
        } else {
            (status, axum::Json(body)).into_response()
        }
    }
}
