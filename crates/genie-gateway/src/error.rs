//! Error types for the gateway.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use genie_client::ClientError;
use genie_common::NormalizeError;

/// Errors that can occur while serving a request or starting the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request is malformed or missing required input.
    #[error("{0}")]
    Validation(String),

    /// The request body exceeds `max_body_bytes`.
    #[error("Request body exceeds the configured size limit")]
    PayloadTooLarge,

    /// Authentication or completion failure from the upstream.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (config file, socket, signals).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias using `GatewayError`.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<NormalizeError> for GatewayError {
    fn from(err: NormalizeError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }
}

impl GatewayError {
    /// HTTP status this error is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Client(ClientError::AuthenticationError { .. }) => StatusCode::UNAUTHORIZED,
            Self::Client(ClientError::ConfigurationError(_))
            | Self::Config(_)
            | Self::Io(_)
            | Self::Toml(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Client(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = Json(ErrorBody {
            error: status.as_str().to_string(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
