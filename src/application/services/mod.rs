//! Application services: routing, fetching, caching, and refresh.

pub mod batch_loader;
pub mod fallback_chain;
pub mod image_service;
pub mod refresh_scheduler;
pub mod retry_controller;
pub mod url_resolver;

pub use batch_loader::{BatchConfig, BatchLoader, BatchResults};
pub use fallback_chain::{ChainSuccess, FallbackChain};
pub use image_service::{ImageService, LoadReport};
pub use refresh_scheduler::{PassReport, RefreshConfig, RefreshScheduler, SchedulerState};
pub use retry_controller::{RetryController, RetryOutcome, RetryPolicy};
pub use url_resolver::{RELAY_QUERY_PARAM, UrlResolver, encode_component};
