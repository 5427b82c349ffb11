//! Ordered fallback across retrieval strategies.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::entities::{
    AttemptOutcome, ImagePayload, LoadAttempt, ResolvedRoute, StrategyKind,
};
use crate::domain::errors::ImageError;
use crate::domain::ports::FetchStrategy;

/// Result of a chain run that produced bytes.
#[derive(Debug, Clone)]
pub struct ChainSuccess {
    /// The payload.
    pub payload: ImagePayload,
    /// Strategy that produced it.
    pub strategy: StrategyKind,
    /// Every strategy execution in this run, including earlier failures.
    pub attempts: Vec<LoadAttempt>,
}

/// Tries each strategy in order until one yields usable bytes.
pub struct FallbackChain {
    strategies: Vec<Arc<dyn FetchStrategy>>,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<_> = self.strategies.iter().map(|s| s.kind()).collect();
        f.debug_struct("FallbackChain")
            .field("strategies", &kinds)
            .finish()
    }
}

impl FallbackChain {
    /// Creates a chain; strategies run in the given order.
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Runs the chain once for a route.
    ///
    /// A strategy failure only moves on to the next strategy. Deterministic
    /// failures stop the chain early since no strategy can recover from them.
    ///
    /// # Errors
    /// Returns the last strategy's error once every strategy has failed.
    pub async fn run(
        &self,
        route: &ResolvedRoute,
        timeout: Duration,
    ) -> Result<ChainSuccess, ImageError> {
        let mut attempts = Vec::with_capacity(self.strategies.len());
        let (payload, strategy) = self.run_recorded(route, timeout, &mut attempts).await?;
        Ok(ChainSuccess {
            payload,
            strategy,
            attempts,
        })
    }

    /// Like [`FallbackChain::run`], appending every strategy execution to `log`
    /// whether or not the chain succeeds.
    ///
    /// # Errors
    /// Returns the last strategy's error once every strategy has failed.
    pub async fn run_recorded(
        &self,
        route: &ResolvedRoute,
        timeout: Duration,
        log: &mut Vec<LoadAttempt>,
    ) -> Result<(ImagePayload, StrategyKind), ImageError> {
        let mut last_error = ImageError::internal("no fetch strategies configured");

        for strategy in &self.strategies {
            let kind = strategy.kind();
            let started = Instant::now();
            let result = strategy.fetch(route, timeout).await;
            let elapsed = started.elapsed();

            match result {
                Ok(payload) => {
                    log.push(LoadAttempt {
                        strategy: kind,
                        outcome: AttemptOutcome::Success,
                        elapsed,
                    });
                    debug!(
                        strategy = %kind,
                        route = route.kind(),
                        bytes = payload.len(),
                        elapsed_ms = elapsed.as_millis(),
                        "Strategy succeeded"
                    );
                    return Ok((payload, kind));
                }
                Err(error) => {
                    warn!(
                        strategy = %kind,
                        route = route.kind(),
                        error = %error,
                        elapsed_ms = elapsed.as_millis(),
                        "Strategy failed"
                    );
                    log.push(LoadAttempt {
                        strategy: kind,
                        outcome: AttemptOutcome::Failure(error.clone()),
                        elapsed,
                    });
                    let retryable = error.is_retryable();
                    last_error = error;
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::ScriptedStrategy;
    use std::sync::atomic::Ordering;
    use url::Url;

    fn route() -> ResolvedRoute {
        ResolvedRoute::Direct(Url::parse("https://cdn.example/a.png").unwrap())
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Credentialed));
        let second = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Anonymous));
        let second_calls = second.calls();
        let chain = FallbackChain::new(vec![first, second]);

        let success = chain.run(&route(), Duration::from_secs(1)).await.unwrap();

        assert_eq!(success.strategy, StrategyKind::Credentialed);
        assert_eq!(success.attempts.len(), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_render_extract() {
        let chain = FallbackChain::new(vec![
            Arc::new(ScriptedStrategy::failing(
                StrategyKind::Credentialed,
                ImageError::opaque("no cors"),
            )),
            Arc::new(ScriptedStrategy::failing(
                StrategyKind::Anonymous,
                ImageError::opaque("opaque"),
            )),
            Arc::new(ScriptedStrategy::succeeding(StrategyKind::RenderExtract)),
        ]);

        let success = chain.run(&route(), Duration::from_secs(1)).await.unwrap();

        assert_eq!(success.strategy, StrategyKind::RenderExtract);
        assert_eq!(success.attempts.len(), 3);
        assert!(!success.attempts[0].is_success());
        assert!(success.attempts[2].is_success());
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let chain = FallbackChain::new(vec![
            Arc::new(ScriptedStrategy::failing(
                StrategyKind::Credentialed,
                ImageError::opaque("no cors"),
            )),
            Arc::new(ScriptedStrategy::failing(
                StrategyKind::Anonymous,
                ImageError::Timeout { elapsed_ms: 5 },
            )),
        ]);

        let error = chain.run(&route(), Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(error, ImageError::Timeout { elapsed_ms: 5 });
    }

    #[tokio::test]
    async fn test_recorded_run_keeps_failed_attempts() {
        let chain = FallbackChain::new(vec![
            Arc::new(ScriptedStrategy::failing(
                StrategyKind::Credentialed,
                ImageError::opaque("no cors"),
            )),
            Arc::new(ScriptedStrategy::failing(
                StrategyKind::Anonymous,
                ImageError::network("reset"),
            )),
        ]);
        let mut log = Vec::new();

        let result = chain.run_recorded(&route(), Duration::from_secs(1), &mut log).await;

        assert!(result.is_err());
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].strategy, StrategyKind::Anonymous);
        assert!(log.iter().all(|a| !a.is_success()));
    }

    #[tokio::test]
    async fn test_deterministic_failure_stops_chain() {
        let fallback = Arc::new(ScriptedStrategy::succeeding(StrategyKind::Anonymous));
        let fallback_calls = fallback.calls();
        let chain = FallbackChain::new(vec![
            Arc::new(ScriptedStrategy::failing(
                StrategyKind::Credentialed,
                ImageError::invalid_reference("bad"),
            )),
            fallback,
        ]);

        let error = chain.run(&route(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(error, ImageError::InvalidReference { .. }));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_is_internal_fault() {
        let chain = FallbackChain::new(Vec::new());
        let error = chain.run(&route(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(error, ImageError::InternalFault { .. }));
    }
}
