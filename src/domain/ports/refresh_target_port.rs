//! Refresh target port: the view whose images are periodically refreshed.

use async_trait::async_trait;

use crate::domain::entities::LoadedImage;

/// Port for the surface that displays images.
#[async_trait]
pub trait RefreshTarget: Send + Sync {
    /// Returns true if the hosting document is visible to the user.
    fn is_visible(&self) -> bool;

    /// Returns the raw references currently displayed.
    fn displayed_references(&self) -> Vec<String>;

    /// Swaps in a freshly resolved image for a displayed reference.
    async fn apply(&self, raw: &str, image: &LoadedImage);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Mock view with a fixed set of references.
    pub struct MockRefreshTarget {
        visible: AtomicBool,
        references: Vec<String>,
        applied: AtomicUsize,
    }

    impl MockRefreshTarget {
        /// Creates a visible target displaying `references`.
        pub fn new(references: &[&str]) -> Self {
            Self {
                visible: AtomicBool::new(true),
                references: references.iter().map(ToString::to_string).collect(),
                applied: AtomicUsize::new(0),
            }
        }

        /// Sets document visibility.
        pub fn set_visible(&self, visible: bool) {
            self.visible.store(visible, Ordering::SeqCst);
        }

        /// Number of images applied.
        pub fn applied(&self) -> usize {
            self.applied.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshTarget for MockRefreshTarget {
        fn is_visible(&self) -> bool {
            self.visible.load(Ordering::SeqCst)
        }

        fn displayed_references(&self) -> Vec<String> {
            self.references.clone()
        }

        async fn apply(&self, _raw: &str, _image: &LoadedImage) {
            self.applied.fetch_add(1, Ordering::SeqCst);
        }
    }
}
