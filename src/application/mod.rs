//! Application layer orchestrating domain ports.

/// Application services.
pub mod services;

pub use services::{
    BatchConfig, BatchLoader, FallbackChain, ImageService, RefreshConfig, RefreshScheduler,
    RetryController, RetryPolicy, SchedulerState, UrlResolver,
};
