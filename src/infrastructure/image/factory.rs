//! Wires the resolution facade from configuration.

use std::sync::Arc;

use tracing::info;

use crate::application::services::{
    BatchConfig, BatchLoader, FallbackChain, ImageService, RetryController, UrlResolver,
};
use crate::domain::entities::Environment;
use crate::domain::errors::ImageError;
use crate::infrastructure::config::LoaderConfig;

use super::fetcher::FetchPipeline;
use super::memory_cache::MemoryImageCache;
use super::strategies::default_strategies;

/// The facade together with the pieces callers inspect or reuse.
#[derive(Debug, Clone)]
pub struct ImageStack {
    /// Resolution facade.
    pub service: Arc<ImageService>,
    /// Concrete cache behind the facade, for statistics.
    pub cache: Arc<MemoryImageCache>,
    /// Effective batch configuration.
    pub batch: BatchConfig,
}

impl ImageStack {
    /// Creates a batch loader over the facade.
    #[must_use]
    pub fn batch_loader(&self) -> BatchLoader {
        BatchLoader::new(self.service.clone(), self.batch)
    }
}

/// Builds the facade with the default strategy chain and a fresh cache.
///
/// # Errors
/// Returns error if the HTTP client cannot be created.
pub fn build_image_stack(
    env: Arc<Environment>,
    config: &LoaderConfig,
    user_agent: &str,
) -> Result<ImageStack, ImageError> {
    let mode = env.mode;
    let pipeline = Arc::new(FetchPipeline::new(env.clone(), user_agent)?);
    let cache = Arc::new(MemoryImageCache::new(
        config.cache_max_entries,
        config.cache_ttl(),
    ));
    let retry = RetryController::new(config.retry_policy(mode));
    let timeout = config.timeout(mode);

    info!(
        environment = %mode,
        timeout_secs = timeout.as_secs(),
        max_attempts = retry.policy().max_attempts(),
        cache_entries = config.cache_max_entries,
        "Image pipeline ready"
    );

    let service = ImageService::new(
        UrlResolver::new(env),
        FallbackChain::new(default_strategies(&pipeline)),
        retry,
        cache.clone(),
        timeout,
    );

    Ok(ImageStack {
        service: Arc::new(service),
        cache,
        batch: config.batch(mode),
    })
}
