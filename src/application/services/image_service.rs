//! Image resolution facade.
//!
//! Combines the resolver, retry controller, fallback chain, and cache into
//! the single entry point the view layer calls.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::entities::{
    ImagePayload, ImageReference, ImageSource, LoadAttempt, LoadedImage, ReferenceKey,
    StrategyKind,
};
use crate::domain::errors::ImageError;
use crate::domain::ports::{ImageCachePort, ImageLoaderPort};

use super::fallback_chain::FallbackChain;
use super::retry_controller::RetryController;
use super::url_resolver::UrlResolver;

/// Outcome of a load together with every strategy execution behind it.
#[derive(Debug)]
pub struct LoadReport {
    /// The image, `None` for blank references, or the final error.
    pub result: Result<Option<LoadedImage>, ImageError>,
    /// Strategy executions across all retry rounds, in order.
    pub attempts: Vec<LoadAttempt>,
    /// Retry rounds performed; zero when served without network work.
    pub rounds: u32,
}

impl LoadReport {
    fn settled(result: Result<Option<LoadedImage>, ImageError>) -> Self {
        Self {
            result,
            attempts: Vec::new(),
            rounds: 0,
        }
    }
}

/// Resolves references into payloads, consulting the cache first.
pub struct ImageService {
    resolver: UrlResolver,
    chain: FallbackChain,
    retry: RetryController,
    cache: Arc<dyn ImageCachePort>,
    timeout: Duration,
    in_flight: Mutex<HashMap<ReferenceKey, Weak<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for ImageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageService")
            .field("chain", &self.chain)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ImageService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        resolver: UrlResolver,
        chain: FallbackChain,
        retry: RetryController,
        cache: Arc<dyn ImageCachePort>,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            chain,
            retry,
            cache,
            timeout,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn ImageCachePort> {
        &self.cache
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drops every cached payload.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Cleared image cache");
    }

    /// Loads a reference and reports every strategy execution.
    pub async fn load_with_report(&self, raw: &str) -> LoadReport {
        let Some(reference) = ImageReference::parse(raw) else {
            return LoadReport::settled(Ok(None));
        };
        if reference.is_data_payload() {
            return LoadReport::settled(Self::inline(&reference).map(Some));
        }

        if let Some(image) = self.cached(&reference).await {
            return LoadReport::settled(Ok(Some(image)));
        }

        let lock = self.key_lock(reference.key());
        let _guard = lock.lock().await;

        // Another task may have finished the same fetch while we waited.
        if let Some(image) = self.cached(&reference).await {
            return LoadReport::settled(Ok(Some(image)));
        }

        self.fetch_and_store(&reference, reference.raw()).await
    }

    /// Reloads a reference past every cache and reports every strategy execution.
    pub async fn reload_with_report(&self, raw: &str) -> LoadReport {
        let Some(reference) = ImageReference::parse(raw) else {
            return LoadReport::settled(Ok(None));
        };
        if reference.is_data_payload() {
            return LoadReport::settled(Self::inline(&reference).map(Some));
        }

        let lock = self.key_lock(reference.key());
        let _guard = lock.lock().await;

        let busted = reference.with_cache_buster(chrono::Utc::now().timestamp_millis());
        self.fetch_and_store(&reference, &busted).await
    }

    /// Per-key lock so concurrent loads of one reference share a single fetch.
    fn key_lock(&self, key: &ReferenceKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock();
        if let Some(lock) = in_flight.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        in_flight.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        in_flight.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }

    async fn attempt_once(
        &self,
        target: &str,
        log: &Mutex<Vec<LoadAttempt>>,
    ) -> Result<(ImagePayload, StrategyKind), ImageError> {
        let route = self
            .resolver
            .resolve(target)?
            .ok_or_else(|| ImageError::invalid_reference("nothing to fetch"))?;
        debug!(route = %route, "Fetching image");

        let mut attempts = Vec::new();
        let result = self
            .chain
            .run_recorded(&route, self.timeout, &mut attempts)
            .await;
        log.lock().extend(attempts);
        result
    }

    async fn fetch_and_store(&self, reference: &ImageReference, target: &str) -> LoadReport {
        let log = Mutex::new(Vec::new());
        let outcome = self.retry.run(|_| self.attempt_once(target, &log)).await;
        let attempts = log.into_inner();

        let result = match outcome.result {
            Ok((payload, strategy)) => {
                let payload = Arc::new(payload);
                self.cache.put(reference.key().clone(), payload.clone()).await;
                debug!(
                    reference = %reference,
                    strategy = %strategy,
                    rounds = outcome.attempts,
                    strategy_runs = attempts.len(),
                    "Image loaded from network"
                );
                Ok(Some(LoadedImage {
                    key: reference.key().clone(),
                    payload,
                    source: ImageSource::Network,
                    strategy: Some(strategy),
                }))
            }
            Err(error) => {
                warn!(
                    reference = %reference,
                    rounds = outcome.attempts,
                    strategy_runs = attempts.len(),
                    error = %error,
                    "Image could not be resolved"
                );
                Err(error)
            }
        };

        LoadReport {
            result,
            attempts,
            rounds: outcome.attempts,
        }
    }

    fn inline(reference: &ImageReference) -> Result<LoadedImage, ImageError> {
        let payload = ImagePayload::from_data_uri(reference.raw())
            .ok_or_else(|| ImageError::invalid_reference("malformed data payload"))?;
        if payload.is_empty() {
            return Err(ImageError::EmptyPayload);
        }
        Ok(LoadedImage {
            key: reference.key().clone(),
            payload: Arc::new(payload),
            source: ImageSource::Inline,
            strategy: None,
        })
    }

    async fn cached(&self, reference: &ImageReference) -> Option<LoadedImage> {
        let payload = self.cache.get(reference.key()).await?;
        debug!(reference = %reference, "Serving image from cache");
        Some(LoadedImage {
            key: reference.key().clone(),
            payload,
            source: ImageSource::MemoryCache,
            strategy: None,
        })
    }
}

#[async_trait::async_trait]
impl ImageLoaderPort for ImageService {
    async fn load(&self, raw: &str) -> Result<Option<LoadedImage>, ImageError> {
        self.load_with_report(raw).await.result
    }

    async fn reload(&self, raw: &str) -> Result<Option<LoadedImage>, ImageError> {
        self.reload_with_report(raw).await.result
    }

    async fn sweep(&self) -> usize {
        self.cache.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::retry_controller::RetryPolicy;
    use crate::domain::entities::{AllowList, Environment, EnvironmentMode, StrategyKind};
    use crate::domain::ports::mocks::ScriptedStrategy;
    use crate::infrastructure::image::MemoryImageCache;
    use std::sync::atomic::Ordering;
    use url::Url;

    fn service(strategy: Arc<ScriptedStrategy>) -> ImageService {
        let env = Environment::new(
            EnvironmentMode::Hosted,
            Url::parse("https://app.example").unwrap(),
            AllowList::new(["storage.example"]),
        );
        ImageService::new(
            UrlResolver::new(Arc::new(env)),
            FallbackChain::new(vec![strategy]),
            RetryController::new(RetryPolicy::new(3)),
            Arc::new(MemoryImageCache::new(16, Duration::from_secs(300))),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_blank_reference_performs_no_fetch() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let calls = strategy.calls();
        let service = service(strategy);

        assert!(service.load("  ").await.unwrap().is_none());
        assert!(service.resolve_source("").await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_load_within_window_hits_cache() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let calls = strategy.calls();
        let service = service(strategy);

        let first = service
            .load("https://storage.example/a.png?t=1")
            .await
            .unwrap()
            .unwrap();
        let second = service
            .load("https://storage.example/a.png?t=2")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.source, ImageSource::Network);
        assert_eq!(second.source, ImageSource::MemoryCache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_forces_fresh_fetch() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let calls = strategy.calls();
        let service = service(strategy);

        service.load("https://storage.example/a.png").await.unwrap();
        tokio::time::sleep(Duration::from_secs(301)).await;
        let again = service
            .load("https://storage.example/a.png")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(again.source, ImageSource::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let calls = strategy.calls();
        let service = service(strategy);

        let (a, b) = tokio::join!(
            service.load("https://storage.example/a.png"),
            service.load("https://storage.example/a.png?cb=9"),
        );

        assert!(a.unwrap().is_some());
        assert!(b.unwrap().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let strategy = Arc::new(
            ScriptedStrategy::succeeding(StrategyKind::Credentialed)
                .then(Err(ImageError::network("reset")))
                .then(Err(ImageError::EmptyPayload)),
        );
        let calls = strategy.calls();
        let service = service(strategy);

        let image = service.load("https://storage.example/a.png").await.unwrap();

        assert!(image.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_inline_payload_skips_network() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let calls = strategy.calls();
        let service = service(strategy);

        let image = service
            .load("data:image/png;base64,iVBORw0KGgo=")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(image.source, ImageSource::Inline);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reload_bypasses_cache() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let calls = strategy.calls();
        let service = service(strategy);

        service.load("https://storage.example/a.png").await.unwrap();
        let reloaded = service
            .reload("https://storage.example/a.png")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reloaded.source, ImageSource::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_lists_every_strategy_run() {
        let strategy = Arc::new(
            ScriptedStrategy::succeeding(StrategyKind::Anonymous)
                .then(Err(ImageError::Timeout { elapsed_ms: 10 })),
        );
        let service = service(strategy);

        let report = service
            .load_with_report("https://storage.example/a.png")
            .await;

        assert!(report.result.unwrap().is_some());
        assert_eq!(report.rounds, 2);
        assert_eq!(report.attempts.len(), 2);
        assert!(!report.attempts[0].is_success());
        assert!(report.attempts[1].is_success());
    }

    #[tokio::test]
    async fn test_deterministic_failure_is_reported_once() {
        let strategy = Arc::new(ScriptedStrategy::failing(
            StrategyKind::Credentialed,
            ImageError::internal("broken"),
        ));
        let calls = strategy.calls();
        let service = service(strategy);

        let report = service
            .load_with_report("https://storage.example/a.png")
            .await;

        assert!(matches!(report.result, Err(ImageError::InternalFault { .. })));
        assert_eq!(report.rounds, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_stale_entries() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let service = service(strategy);

        service.load("https://storage.example/a.png").await.unwrap();
        assert_eq!(service.sweep().await, 0);
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(service.sweep().await, 1);
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let calls = strategy.calls();
        let service = service(strategy);

        service.load("https://storage.example/a.png").await.unwrap();
        service.clear_cache().await;
        assert!(service.cache().is_empty());

        let again = service
            .load("https://storage.example/a.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.source, ImageSource::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_source_returns_data_uri() {
        let strategy = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let service = service(strategy);

        let source = service
            .resolve_source("https://storage.example/a.png")
            .await
            .unwrap();
        assert!(source.starts_with("data:image/png;base64,"));
    }
}
