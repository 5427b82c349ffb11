//! Diagnostics for individual strategy executions.

use std::time::Duration;

use crate::domain::errors::ImageError;

/// Retrieval strategies, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Cross-origin request that must come back readable.
    Credentialed,
    /// Request without credentials; opaque results only from benign origins.
    Anonymous,
    /// Decode through an image decoder and re-encode as PNG.
    RenderExtract,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credentialed => write!(f, "credentialed"),
            Self::Anonymous => write!(f, "anonymous"),
            Self::RenderExtract => write!(f, "render-extract"),
        }
    }
}

/// Outcome of one strategy execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Usable bytes were produced.
    Success,
    /// The strategy failed with this error.
    Failure(ImageError),
}

/// Transient record of one strategy execution. Never persisted.
#[derive(Debug, Clone)]
pub struct LoadAttempt {
    /// Strategy that ran.
    pub strategy: StrategyKind,
    /// What happened.
    pub outcome: AttemptOutcome,
    /// Wall time spent.
    pub elapsed: Duration,
}

impl LoadAttempt {
    /// Returns true if the attempt produced a payload.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }
}
