//! Reference routing.
//!
//! Only references to allow-listed storage hosts are rewritten; everything
//! else is assumed to be same-origin safe and passes through untouched.

use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::trace;
use url::Url;

use crate::domain::entities::{Environment, EnvironmentMode, ResolvedRoute, is_data_payload};
use crate::domain::errors::ImageError;

/// Query parameter that carries the upstream URL to the relay.
pub const RELAY_QUERY_PARAM: &str = "url";

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Escapes a value for use as a single query parameter.
#[must_use]
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Picks a route for each reference based on the injected environment.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    env: Arc<Environment>,
}

impl UrlResolver {
    /// Creates a resolver for the given environment.
    #[must_use]
    pub const fn new(env: Arc<Environment>) -> Self {
        Self { env }
    }

    /// Returns the environment this resolver routes for.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Resolves a raw reference to a route.
    ///
    /// Blank and inline `data:` references yield `Ok(None)`: there is nothing to fetch.
    ///
    /// # Errors
    /// Returns [`ImageError::InvalidReference`] if the reference cannot be
    /// interpreted as an absolute or page-relative http(s) URL.
    pub fn resolve(&self, raw: &str) -> Result<Option<ResolvedRoute>, ImageError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || is_data_payload(trimmed) {
            return Ok(None);
        }

        let url = self.absolutize(trimmed)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ImageError::invalid_reference(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        if !self.env.allowed_hosts.permits(&url) {
            trace!(url = %url, "Host not allow-listed, passing through");
            return Ok(Some(ResolvedRoute::Direct(url)));
        }

        let route = match self.env.mode {
            EnvironmentMode::Development => ResolvedRoute::DevRelay(self.dev_relay_url(&url)),
            EnvironmentMode::Hosted => ResolvedRoute::ProdRelay(self.prod_relay_url(&url)),
        };
        trace!(route = %route, "Resolved reference");
        Ok(Some(route))
    }

    fn absolutize(&self, trimmed: &str) -> Result<Url, ImageError> {
        match Url::parse(trimmed) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .env
                .page_origin
                .join(trimmed)
                .map_err(|e| ImageError::invalid_reference(format!("{trimmed}: {e}"))),
            Err(e) => Err(ImageError::invalid_reference(format!("{trimmed}: {e}"))),
        }
    }

    fn dev_relay_url(&self, upstream: &Url) -> Url {
        let mut target = self.env.page_origin.clone();
        let prefix = self.env.dev_relay_prefix.trim_end_matches('/');
        target.set_path(&format!("{prefix}{}", upstream.path()));
        target.set_query(upstream.query());
        target.set_fragment(None);
        target
    }

    fn prod_relay_url(&self, upstream: &Url) -> Url {
        let mut target = self.env.page_origin.clone();
        target.set_path(&self.env.relay_path);
        let query = format!("{RELAY_QUERY_PARAM}={}", encode_component(upstream.as_str()));
        target.set_query(Some(&query));
        target.set_fragment(None);
        target
    }
}
