//! Image retrieval infrastructure.
//!
//! This module provides:
//! - The reqwest fetch pipeline and the three retrieval strategies
//! - An in-memory LRU cache with a freshness window
//! - Wiring of the resolution facade from configuration

pub mod factory;
pub mod fetcher;
pub mod memory_cache;
pub mod strategies;

pub use factory::{ImageStack, build_image_stack};
pub use fetcher::{FetchPipeline, FetchedResponse, RequestMode, USER_AGENT};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use strategies::{
    AnonymousStrategy, CredentialedStrategy, RenderExtractStrategy, default_strategies,
};
