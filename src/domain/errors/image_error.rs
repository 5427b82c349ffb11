//! Image resolution error types.

use thiserror::Error;

/// Image resolution error variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum ImageError {
    #[error("invalid image reference: {reason}")]
    InvalidReference { reason: String },

    #[error("domain not allowed: {host}")]
    DomainRejected { host: String },

    #[error("network failure: {message}")]
    NetworkFailure { message: String },

    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("opaque response: {reason}")]
    OpaqueBlocked { reason: String },

    #[error("upstream returned an empty payload")]
    EmptyPayload,

    #[error("upstream responded {status}: {reason}")]
    RelayUpstreamError { status: u16, reason: String },

    #[error("internal fault: {message}")]
    InternalFault { message: String },
}

impl ImageError {
    /// Creates invalid reference error.
    #[must_use]
    pub fn invalid_reference(reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reason: reason.into(),
        }
    }

    /// Creates domain rejected error.
    #[must_use]
    pub fn domain_rejected(host: impl Into<String>) -> Self {
        Self::DomainRejected { host: host.into() }
    }

    /// Creates network failure error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            message: message.into(),
        }
    }

    /// Creates timeout error.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn timeout(elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Creates opaque response error.
    #[must_use]
    pub fn opaque(reason: impl Into<String>) -> Self {
        Self::OpaqueBlocked {
            reason: reason.into(),
        }
    }

    /// Creates upstream status error.
    #[must_use]
    pub fn upstream(status: u16, reason: impl Into<String>) -> Self {
        Self::RelayUpstreamError {
            status,
            reason: reason.into(),
        }
    }

    /// Creates internal fault error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalFault {
            message: message.into(),
        }
    }

    /// Returns true if another attempt may succeed.
    ///
    /// Reference and allow-list failures are deterministic. Relay-side
    /// upstream and internal faults are surfaced immediately.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure { .. }
                | Self::Timeout { .. }
                | Self::EmptyPayload
                | Self::OpaqueBlocked { .. }
        )
    }
}
