//! Image loader port: the narrow interface the view layer calls into.

use async_trait::async_trait;

use crate::domain::entities::LoadedImage;
use crate::domain::errors::ImageError;

/// Port for resolving references into displayable images.
#[async_trait]
pub trait ImageLoaderPort: Send + Sync {
    /// Loads a reference, serving fresh cache entries when present.
    ///
    /// Returns `Ok(None)` when the reference is blank and there is nothing to fetch.
    async fn load(&self, raw: &str) -> Result<Option<LoadedImage>, ImageError>;

    /// Loads a reference bypassing the cache and any intermediary caching.
    async fn reload(&self, raw: &str) -> Result<Option<LoadedImage>, ImageError>;

    /// Returns a usable image source string, or `None` on any failure.
    async fn resolve_source(&self, raw: &str) -> Option<String> {
        match self.load(raw).await {
            Ok(Some(image)) => Some(image.to_data_uri()),
            Ok(None) | Err(_) => None,
        }
    }

    /// Drops stale cached state. Returns how many entries were removed.
    async fn sweep(&self) -> usize {
        0
    }
}
