//! Domain entity definitions.

mod attempt;
mod environment;
mod payload;
mod reference;
mod route;

pub use attempt::{AttemptOutcome, LoadAttempt, StrategyKind};
pub use environment::{AllowList, Environment, EnvironmentMode};
pub use payload::{DEFAULT_CONTENT_TYPE, ImagePayload, ImageSource, LoadedImage};
pub use reference::{
    CACHE_BUSTER_PARAM, ImageReference, ReferenceKey, VOLATILE_PARAMS, is_data_payload,
};
pub use route::ResolvedRoute;
