//! Port definition for image payload caching.

use std::sync::Arc;

use crate::domain::entities::{ImagePayload, ReferenceKey};

/// Port for image caching operations.
/// Implementations must be thread-safe and replace entries whole.
#[async_trait::async_trait]
pub trait ImageCachePort: Send + Sync {
    /// Returns a fresh payload, or `None` if absent or stale.
    async fn get(&self, key: &ReferenceKey) -> Option<Arc<ImagePayload>>;

    /// Stores a payload stamped with the current time.
    async fn put(&self, key: ReferenceKey, payload: Arc<ImagePayload>);

    /// Returns the current number of cached payloads.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all payloads, e.g. under memory pressure.
    async fn clear(&self);

    /// Drops every stale payload. Returns how many were removed.
    async fn purge_expired(&self) -> usize;
}
