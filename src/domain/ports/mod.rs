mod fetch_strategy_port;
mod image_cache_port;
mod image_loader_port;
mod refresh_target_port;

pub use fetch_strategy_port::FetchStrategy;
pub use image_cache_port::ImageCachePort;
pub use image_loader_port::ImageLoaderPort;
pub use refresh_target_port::RefreshTarget;

#[cfg(test)]
pub mod mocks {
    pub use super::fetch_strategy_port::mock::ScriptedStrategy;
    pub use super::image_loader_port::mock::MockImageLoader;
    pub use super::refresh_target_port::mock::MockRefreshTarget;
}
