//! Domain layer with core entities, errors, and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{Environment, ImagePayload, ImageReference, LoadedImage, ResolvedRoute};
pub use errors::ImageError;
pub use ports::{FetchStrategy, ImageCachePort, ImageLoaderPort, RefreshTarget};
