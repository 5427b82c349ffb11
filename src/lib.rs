//! imgrelay - resilient remote image loading and a same-origin image relay.
//!
//! References are routed through a relay when their host is allow-listed,
//! fetched through an ordered fallback of strategies with bounded retries,
//! cached in memory for a freshness window, and periodically refreshed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the loading services.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing HTTP, cache, relay, and configuration adapters.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "imgrelay";
