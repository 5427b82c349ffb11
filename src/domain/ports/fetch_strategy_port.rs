//! Fetch strategy port definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::entities::{ImagePayload, ResolvedRoute, StrategyKind};
use crate::domain::errors::ImageError;

/// One way of turning a resolved route into usable bytes.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Identifies the strategy in diagnostics.
    fn kind(&self) -> StrategyKind;

    /// Performs a single bounded retrieval.
    async fn fetch(
        &self,
        route: &ResolvedRoute,
        timeout: Duration,
    ) -> Result<ImagePayload, ImageError>;
}
