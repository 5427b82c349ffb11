//! Paced, capped concurrent loading of many references.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::domain::entities::{ImageReference, LoadedImage};
use crate::domain::ports::ImageLoaderPort;

/// Default pause between groups.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(300);

/// Batch loader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// References resolved concurrently per group; also the in-flight cap.
    pub batch_size: usize,
    /// Pause inserted between groups.
    pub pause: Duration,
}

impl BatchConfig {
    /// Creates a configuration; a zero batch size is treated as one.
    #[must_use]
    pub fn new(batch_size: usize, pause: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pause,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new(3, DEFAULT_BATCH_PAUSE)
    }
}

/// Results keyed by the raw reference supplied by the caller.
pub type BatchResults = HashMap<String, Option<LoadedImage>>;

/// Loads references group by group, isolating failures per reference.
pub struct BatchLoader {
    loader: Arc<dyn ImageLoaderPort>,
    config: BatchConfig,
}

impl std::fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BatchLoader {
    /// Creates a batch loader.
    #[must_use]
    pub fn new(loader: Arc<dyn ImageLoaderPort>, config: BatchConfig) -> Self {
        Self { loader, config }
    }

    /// Loads every reference and returns a payload-or-`None` per input.
    ///
    /// References sharing a normalized form are fetched once. Never fails
    /// as a whole; individual failures map to `None`.
    pub async fn load_all<S: AsRef<str>>(&self, references: &[S]) -> BatchResults {
        let mut results = BatchResults::with_capacity(references.len());
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        let mut aliases: HashMap<String, String> = HashMap::new();

        for raw in references {
            let raw = raw.as_ref();
            match ImageReference::parse(raw) {
                None => {
                    results.insert(raw.to_string(), None);
                }
                Some(reference) => {
                    if seen.insert(reference.key().clone()) {
                        aliases.insert(reference.key().to_string(), raw.to_string());
                        unique.push(raw.to_string());
                    } else if let Some(first) = aliases.get(reference.key().as_str()) {
                        if first != raw {
                            debug!(reference = raw, "Duplicate reference, sharing result");
                        }
                    }
                }
            }
        }

        let groups = unique.chunks(self.config.batch_size).count();
        let mut loaded = 0usize;
        for (index, group) in unique.chunks(self.config.batch_size).enumerate() {
            let outcomes = join_all(group.iter().map(|raw| self.loader.load(raw))).await;

            for (raw, outcome) in group.iter().zip(outcomes) {
                let image = match outcome {
                    Ok(image) => image,
                    Err(error) => {
                        warn!(reference = %raw, error = %error, "Batch entry failed");
                        None
                    }
                };
                loaded += usize::from(image.is_some());
                results.insert(raw.clone(), image);
            }

            if index + 1 < groups && !self.config.pause.is_zero() {
                tokio::time::sleep(self.config.pause).await;
            }
        }

        // Duplicates share their first occurrence's result.
        for raw in references {
            let raw = raw.as_ref();
            if results.contains_key(raw) {
                continue;
            }
            let shared = ImageReference::parse(raw)
                .and_then(|r| aliases.get(r.key().as_str()))
                .and_then(|first| results.get(first).cloned())
                .flatten();
            results.insert(raw.to_string(), shared);
        }

        info!(
            requested = references.len(),
            unique = unique.len(),
            loaded,
            "Batch load finished"
        );
        results
    }
}
