//! In-memory LRU payload cache with a freshness window.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use lru::LruCache;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::entities::{ImagePayload, ReferenceKey};
use crate::domain::ports::ImageCachePort;

/// Default maximum number of payloads kept in memory.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Default freshness window.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    payload: Arc<ImagePayload>,
    stored_at: Instant,
}

/// Bounded cache whose entries go stale after a fixed window.
///
/// Eviction order follows store time only; reads never promote an entry.
/// Stale entries are never served; they are dropped on access or by
/// [`ImageCachePort::purge_expired`].
pub struct MemoryImageCache {
    cache: RwLock<LruCache<ReferenceKey, CacheEntry>>,
    ttl: Duration,
    size: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl MemoryImageCache {
    /// Creates a cache holding at most `capacity` payloads for `ttl` each.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(cap)),
            ttl,
            size: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the freshness window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
            size: self.len(),
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL)
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of misses, stale entries included.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached payloads.
    pub size: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} payloads, {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.size, self.hit_rate, self.hits, self.misses, self.evictions
        )
    }
}

#[async_trait::async_trait]
impl ImageCachePort for MemoryImageCache {
    async fn get(&self, key: &ReferenceKey) -> Option<Arc<ImagePayload>> {
        let mut cache = self.cache.write().await;
        let lookup = cache
            .peek(key)
            .map(|entry| (entry.stored_at.elapsed() < self.ttl).then(|| entry.payload.clone()));
        let fresh = match lookup {
            Some(Some(payload)) => Some(payload),
            Some(None) => {
                cache.pop(key);
                self.size.store(cache.len(), Ordering::Relaxed);
                trace!(key = %key, "Memory cache entry stale");
                None
            }
            None => None,
        };

        if fresh.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
        }
        fresh
    }

    async fn put(&self, key: ReferenceKey, payload: Arc<ImagePayload>) {
        let mut cache = self.cache.write().await;
        debug!(key = %key, bytes = payload.len(), "Storing payload in memory cache");
        let entry = CacheEntry {
            payload,
            stored_at: Instant::now(),
        };
        if let Some((evicted, _)) = cache.push(key.clone(), entry)
            && evicted != key
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(key = %evicted, "Evicted oldest payload");
        }
        self.size.store(cache.len(), Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
        self.size.store(0, Ordering::Relaxed);
        debug!("Cleared memory image cache");
    }

    async fn purge_expired(&self) -> usize {
        let mut cache = self.cache.write().await;
        let stale: Vec<ReferenceKey> = cache
            .iter()
            .filter(|(_, entry)| entry.stored_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        self.size.store(cache.len(), Ordering::Relaxed);
        if !stale.is_empty() {
            debug!(count = stale.len(), "Purged stale payloads");
        }
        stale.len()
    }
}
