//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image retrieval (fetch pipeline, strategies, memory cache).
pub mod image;
/// Same-origin image relay.
pub mod relay;
/// Payload persistence and the headless refresh target.
pub mod sink;

pub use config::{AppConfig, CliArgs, Command, ConfigError, LogLevel, StorageManager};
pub use image::{CacheStats, ImageStack, MemoryImageCache, build_image_stack};
pub use relay::{RelayError, RelayState};
pub use sink::{PayloadSink, WatchTarget};
