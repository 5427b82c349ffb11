//! Writing loaded payloads to disk, and the headless refresh target built on it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::domain::entities::LoadedImage;
use crate::domain::ports::RefreshTarget;

/// Writes payloads into a directory as `<key digest>.<extension>`.
#[derive(Debug, Clone)]
pub struct PayloadSink {
    dir: PathBuf,
}

impl PayloadSink {
    /// Creates a sink; the directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path an image is written to.
    #[must_use]
    pub fn path_for(&self, image: &LoadedImage) -> PathBuf {
        self.dir.join(format!(
            "{}.{}",
            image.key.digest(),
            image.payload.extension()
        ))
    }

    /// Writes an image, replacing any previous version.
    ///
    /// # Errors
    /// Returns error if the directory or file cannot be written.
    pub async fn write(&self, image: &LoadedImage) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(image);
        fs::write(&path, image.payload.bytes()).await?;
        debug!(path = ?path, bytes = image.payload.len(), "Wrote payload");
        Ok(path)
    }
}

/// Refresh target for a fixed list of references with no document to hide.
#[derive(Debug)]
pub struct WatchTarget {
    references: Vec<String>,
    sink: Option<PayloadSink>,
    applied: AtomicUsize,
}

impl WatchTarget {
    /// Creates a target, optionally persisting every refreshed image.
    #[must_use]
    pub fn new(references: Vec<String>, sink: Option<PayloadSink>) -> Self {
        Self {
            references,
            sink,
            applied: AtomicUsize::new(0),
        }
    }

    /// Number of images applied so far.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RefreshTarget for WatchTarget {
    fn is_visible(&self) -> bool {
        true
    }

    fn displayed_references(&self) -> Vec<String> {
        self.references.clone()
    }

    async fn apply(&self, raw: &str, image: &LoadedImage) {
        self.applied.fetch_add(1, Ordering::Relaxed);
        info!(
            reference = raw,
            bytes = image.payload.len(),
            content_type = image.payload.content_type(),
            "Image refreshed"
        );
        if let Some(sink) = &self.sink
            && let Err(e) = sink.write(image).await
        {
            warn!(reference = raw, error = %e, "Failed to persist refreshed image");
        }
    }
}
