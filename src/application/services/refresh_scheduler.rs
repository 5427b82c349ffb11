//! Periodic re-resolution of displayed images, guarded by a circuit breaker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ports::{ImageLoaderPort, RefreshTarget};

/// Default interval between refresh passes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(120);

/// Default number of consecutive failed passes before the circuit opens.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Interval between passes.
    pub interval: Duration,
    /// Consecutive failed passes tolerated before stopping.
    pub max_failures: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer is armed.
    Stopped,
    /// Passes run on every tick.
    Running,
    /// Too many consecutive failures; automatic passes are suspended until reset.
    CircuitOpen,
}

/// Counts for one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// References re-resolved.
    pub attempted: usize,
    /// References that produced a fresh image.
    pub succeeded: usize,
}

impl PassReport {
    /// A pass fails when it attempted work and nothing came back.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    failures: AtomicU32,
}

/// Re-resolves every displayed reference on a fixed interval.
pub struct RefreshScheduler {
    loader: Arc<dyn ImageLoaderPort>,
    target: Arc<dyn RefreshTarget>,
    config: RefreshConfig,
    session: Uuid,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RefreshScheduler {
    /// Creates a stopped scheduler.
    #[must_use]
    pub fn new(
        loader: Arc<dyn ImageLoaderPort>,
        target: Arc<dyn RefreshTarget>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            loader,
            target,
            config,
            session: Uuid::new_v4(),
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::Stopped),
                failures: AtomicU32::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock()
    }

    /// Consecutive failed passes so far.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.failures.load(Ordering::SeqCst)
    }

    /// Arms the timer. Must be called from within a Tokio runtime.
    ///
    /// Returns false if already running or if the circuit is open.
    pub fn start(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            match *state {
                SchedulerState::Running => {
                    debug!(session = %self.session, "Refresh already running");
                    return false;
                }
                SchedulerState::CircuitOpen => {
                    warn!(session = %self.session, "Refresh circuit open, not starting");
                    return false;
                }
                SchedulerState::Stopped => *state = SchedulerState::Running,
            }
        }

        let loader = self.loader.clone();
        let target = self.target.clone();
        let shared = self.shared.clone();
        let config = self.config;
        let session = self.session;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + config.interval, config.interval);

            loop {
                ticker.tick().await;

                if *shared.state.lock() != SchedulerState::Running {
                    break;
                }
                if !target.is_visible() {
                    debug!(session = %session, "Document hidden, skipping refresh");
                    continue;
                }

                let purged = loader.sweep().await;
                if purged > 0 {
                    debug!(session = %session, purged, "Swept stale cache entries");
                }

                let report = refresh_pass(loader.as_ref(), target.as_ref()).await;
                if report.is_failure() {
                    let failures = shared.failures.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(
                        session = %session,
                        failures,
                        attempted = report.attempted,
                        "Refresh pass failed"
                    );
                    if failures >= config.max_failures {
                        let mut state = shared.state.lock();
                        if *state == SchedulerState::Running {
                            *state = SchedulerState::CircuitOpen;
                        }
                        warn!(session = %session, "Refresh circuit opened");
                        break;
                    }
                } else {
                    shared.failures.store(0, Ordering::SeqCst);
                    debug!(
                        session = %session,
                        attempted = report.attempted,
                        succeeded = report.succeeded,
                        "Refresh pass finished"
                    );
                }
            }

            debug!(session = %session, "Refresh loop stopped");
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        info!(
            session = %self.session,
            interval_secs = self.config.interval.as_secs(),
            "Refresh scheduler started"
        );
        true
    }

    /// Cancels the timer. Does not clear an open circuit.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == SchedulerState::Running {
                *state = SchedulerState::Stopped;
            }
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!(session = %self.session, "Refresh scheduler stopped");
        }
    }

    /// Closes the circuit and clears the failure count, leaving the scheduler stopped.
    pub fn reset(&self) {
        self.stop();
        *self.shared.state.lock() = SchedulerState::Stopped;
        self.shared.failures.store(0, Ordering::SeqCst);
        info!(session = %self.session, "Refresh circuit reset");
    }

    /// Runs one pass immediately, regardless of visibility or circuit state.
    ///
    /// Returns the number of images refreshed.
    pub async fn refresh_now(&self) -> usize {
        let report = refresh_pass(self.loader.as_ref(), self.target.as_ref()).await;
        info!(
            session = %self.session,
            attempted = report.attempted,
            succeeded = report.succeeded,
            "Manual refresh finished"
        );
        report.succeeded
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn refresh_pass(loader: &dyn ImageLoaderPort, target: &dyn RefreshTarget) -> PassReport {
    let references = target.displayed_references();
    let outcomes = join_all(references.iter().map(|raw| loader.reload(raw))).await;

    let mut report = PassReport::default();
    for (raw, outcome) in references.iter().zip(outcomes) {
        match outcome {
            Ok(Some(image)) => {
                report.attempted += 1;
                target.apply(raw, &image).await;
                report.succeeded += 1;
            }
            Ok(None) => {}
            Err(error) => {
                report.attempted += 1;
                debug!(reference = %raw, error = %error, "Refresh failed for reference");
            }
        }
    }
    report
}
