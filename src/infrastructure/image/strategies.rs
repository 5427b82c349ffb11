//! The three retrieval strategies, tried in order by the fallback chain.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::ImageFormat;
use tracing::debug;

use crate::domain::entities::{ImagePayload, ResolvedRoute, StrategyKind};
use crate::domain::errors::ImageError;
use crate::domain::ports::FetchStrategy;

use super::fetcher::{FetchPipeline, RequestMode};

/// Returns true if a non-CORS response from this route is still readable.
fn readable_without_cors(pipeline: &FetchPipeline, route: &ResolvedRoute) -> bool {
    route.is_relayed() || pipeline.environment().is_same_origin(route.url())
}

/// Origin-announcing request that requires a CORS grant.
#[derive(Debug, Clone)]
pub struct CredentialedStrategy {
    pipeline: Arc<FetchPipeline>,
}

impl CredentialedStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(pipeline: Arc<FetchPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl FetchStrategy for CredentialedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Credentialed
    }

    async fn fetch(
        &self,
        route: &ResolvedRoute,
        timeout: Duration,
    ) -> Result<ImagePayload, ImageError> {
        let response = self
            .pipeline
            .fetch_once(route.url(), RequestMode::Credentialed, timeout)
            .await?;
        if !response.cors_allowed && !readable_without_cors(&self.pipeline, route) {
            return Err(ImageError::opaque("upstream did not grant cross-origin access"));
        }
        Ok(response.payload)
    }
}

/// Plain request; accepts opaque responses only from allow-listed hosts.
#[derive(Debug, Clone)]
pub struct AnonymousStrategy {
    pipeline: Arc<FetchPipeline>,
}

impl AnonymousStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(pipeline: Arc<FetchPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl FetchStrategy for AnonymousStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Anonymous
    }

    async fn fetch(
        &self,
        route: &ResolvedRoute,
        timeout: Duration,
    ) -> Result<ImagePayload, ImageError> {
        let response = self
            .pipeline
            .fetch_once(route.url(), RequestMode::Anonymous, timeout)
            .await?;
        let benign = self.pipeline.environment().allowed_hosts.permits(route.url());
        if !response.cors_allowed && !benign && !readable_without_cors(&self.pipeline, route) {
            return Err(ImageError::opaque("opaque response from unlisted host"));
        }
        Ok(response.payload)
    }
}

/// Decodes the image and re-encodes it as PNG, discarding the original container.
#[derive(Debug, Clone)]
pub struct RenderExtractStrategy {
    pipeline: Arc<FetchPipeline>,
}

impl RenderExtractStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(pipeline: Arc<FetchPipeline>) -> Self {
        Self { pipeline }
    }
}

/// Decodes any supported format and re-encodes it as PNG.
fn render_to_png(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ImageError::opaque(format!("could not render image: {e}")))?;
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ImageError::internal(format!("could not extract rendered pixels: {e}")))?;
    Ok(out.into_inner())
}

#[async_trait]
impl FetchStrategy for RenderExtractStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RenderExtract
    }

    async fn fetch(
        &self,
        route: &ResolvedRoute,
        timeout: Duration,
    ) -> Result<ImagePayload, ImageError> {
        let response = self
            .pipeline
            .fetch_once(route.url(), RequestMode::Anonymous, timeout)
            .await?;
        let source = response.payload.bytes().clone();

        let png = tokio::task::spawn_blocking(move || render_to_png(&source))
            .await
            .map_err(|e| ImageError::internal(format!("render task failed: {e}")))??;
        debug!(route = route.kind(), bytes = png.len(), "Extracted rendered image");
        Ok(ImagePayload::new(png, Some("image/png")))
    }
}

/// Builds the default chain order: credentialed, anonymous, render-extract.
#[must_use]
pub fn default_strategies(pipeline: &Arc<FetchPipeline>) -> Vec<Arc<dyn FetchStrategy>> {
    vec![
        Arc::new(CredentialedStrategy::new(pipeline.clone())),
        Arc::new(AnonymousStrategy::new(pipeline.clone())),
        Arc::new(RenderExtractStrategy::new(pipeline.clone())),
    ]
}
