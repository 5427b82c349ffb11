//! Relay error types and response formatting.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::errors::ImageError;

/// Relay failure, rendered as `{ "error": "<message>" }` with a matching status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// No `url` query parameter.
    #[error("URL parameter is required")]
    MissingUrl,

    /// The `url` parameter is not valid percent-encoded UTF-8.
    #[error("Invalid URL encoding")]
    InvalidEncoding,

    /// The decoded target is not an absolute http(s) URL.
    #[error("Invalid URL")]
    InvalidUrl,

    /// The target host is not allow-listed.
    #[error("Domain not allowed")]
    DomainNotAllowed {
        /// Rejected host.
        host: String,
    },

    /// Anything but GET or OPTIONS.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The upstream did not answer within the relay timeout.
    #[error("Request timeout")]
    Timeout,

    /// The upstream failed or answered with a non-success status.
    #[error("Failed to fetch image: {reason}")]
    Upstream {
        /// Status relayed to the caller.
        status: StatusCode,
        /// Upstream reason phrase or transport error.
        reason: String,
    },

    /// Unexpected relay fault.
    #[error("Internal server error")]
    Internal(String),
}

impl RelayError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl | Self::InvalidEncoding | Self::InvalidUrl => StatusCode::BAD_REQUEST,
            Self::DomainNotAllowed { .. } => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Upstream { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ImageError> for RelayError {
    fn from(error: ImageError) -> Self {
        match error {
            ImageError::InvalidReference { .. } => Self::InvalidUrl,
            ImageError::DomainRejected { host } => Self::DomainNotAllowed { host },
            ImageError::Timeout { .. } => Self::Timeout,
            ImageError::NetworkFailure { message } => Self::Upstream {
                status: StatusCode::BAD_GATEWAY,
                reason: message,
            },
            ImageError::RelayUpstreamError { status, reason } => Self::Upstream {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                reason,
            },
            ImageError::OpaqueBlocked { reason }
            | ImageError::InternalFault { message: reason } => Self::Internal(reason),
            ImageError::EmptyPayload => Self::Internal("empty upstream payload".to_string()),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(detail) => tracing::error!(error = %detail, "relay internal error"),
            Self::Upstream { reason, .. } => {
                tracing::warn!(
                    status = status.as_u16(),
                    reason = %reason,
                    "relay upstream failure"
                );
            }
            Self::DomainNotAllowed { host } => {
                tracing::warn!(host = %host, "relay target not allow-listed");
            }
            _ => tracing::debug!(status = status.as_u16(), error = %self, "relay request rejected"),
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
