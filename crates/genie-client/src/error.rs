//! Error types for the client library.

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while authenticating or requesting a completion.
///
/// The type is `Clone` because a single token fetch can be awaited by many
/// callers at once; every one of them receives the same error.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network or HTTP transport failure.
    ///
    /// DNS resolution, connection failures, broken bodies and client-side
    /// timeouts all end up here.
    #[error("Network error: {0}")]
    NetworkError(#[source] Arc<reqwest::Error>),

    /// Failure raised by a middleware layer of the HTTP client.
    #[error("Middleware error: {0}")]
    MiddlewareError(String),

    /// The auth endpoint refused to issue a token.
    #[error("Authentication failed with status {status}: {body}")]
    AuthenticationError {
        /// HTTP status returned by the auth endpoint.
        status: StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// The completion endpoint answered with a non-success status.
    #[error("Completion failed with status {status}: {body}")]
    UpstreamError {
        /// HTTP status returned by the completion endpoint.
        status: StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// A response body could not be decoded into the expected shape.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The completion succeeded but carried no choices.
    #[error("Empty response: upstream returned no choices")]
    EmptyResponse,

    /// The background token fetch ended without producing a result.
    #[error("Token fetch failed: {0}")]
    TaskFailed(String),

    /// Client configuration issue, such as a missing API key.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkError(Arc::new(err))
    }
}

impl From<reqwest_middleware::Error> for ClientError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => Self::MiddlewareError(format!("{e:#}")),
        }
    }
}

impl ClientError {
    /// Check if the auth endpoint rejected the identity.
    pub const fn is_authentication_error(&self) -> bool {
        matches!(self, Self::AuthenticationError { .. })
    }

    /// Check if the completion endpoint returned a non-success status.
    pub const fn is_upstream_error(&self) -> bool {
        matches!(self, Self::UpstreamError { .. })
    }

    /// HTTP status reported by the upstream, when there is one.
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthenticationError { status, .. } | Self::UpstreamError { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_http_failures() {
        let auth = ClientError::AuthenticationError {
            status: StatusCode::UNAUTHORIZED,
            body: "bad key".to_string(),
        };
        let upstream = ClientError::UpstreamError {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };

        assert_eq!(auth.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(upstream.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(ClientError::EmptyResponse.status(), None);
        assert!(auth.is_authentication_error());
        assert!(!auth.is_upstream_error());
        assert!(upstream.is_upstream_error());
    }

    #[test]
    fn test_display_carries_diagnostics() {
        let err = ClientError::UpstreamError {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "slow down".to_string(),
        };
        let message = err.to_string();

        assert!(message.contains("429"));
        assert!(message.contains("slow down"));
    }

    #[test]
    fn test_clones_render_identically() {
        let err = ClientError::ProtocolError("missing field `token`".to_string());
        assert_eq!(err.clone().to_string(), err.to_string());
    }
}
