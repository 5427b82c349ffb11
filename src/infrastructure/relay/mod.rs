//! Same-origin image relay.

pub mod error;
pub mod handler;
pub mod state;

use axum::Router;
use axum::http::{Method, Request, header};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

pub use error::RelayError;
pub use handler::{RELAY_CACHE_CONTROL, extract_target, validate_target};
pub use state::RelayState;

/// Path of the health probe.
pub const HEALTH_PATH: &str = "/health";

/// Builds the relay router: the relay route, the health probe, CORS and request tracing.
pub fn router(state: RelayState) -> Router {
    let path = state.path.clone();
    Router::new()
        .route(
            &path,
            get(handler::relay_image)
                .options(handler::preflight)
                .fallback(handler::method_not_allowed),
        )
        .route(HEALTH_PATH, get(handler::health))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .with_state(state)
}
