//! Single bounded HTTP retrieval shared by every fetch strategy.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, header};
use tracing::{debug, trace, warn};
use url::Url;

use crate::domain::entities::{Environment, ImagePayload};
use crate::domain::errors::ImageError;

/// Default user agent for outgoing image requests.
pub const USER_AGENT: &str = concat!("imgrelay/", env!("CARGO_PKG_VERSION"));

const ACCEPT_IMAGES: &str = "image/avif,image/webp,image/png,image/*;q=0.8,*/*;q=0.5";

/// How a request presents itself to the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Announces the page origin and bypasses intermediary caches.
    Credentialed,
    /// Plain request with no origin.
    Anonymous,
}

/// Bytes plus what the upstream said about cross-origin reads.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// The payload.
    pub payload: ImagePayload,
    /// True if `Access-Control-Allow-Origin` admits the page origin.
    pub cors_allowed: bool,
}

/// Thin reqwest wrapper enforcing a per-attempt deadline.
#[derive(Debug, Clone)]
pub struct FetchPipeline {
    client: Client,
    env: Arc<Environment>,
    origin: String,
}

impl FetchPipeline {
    /// Creates a pipeline with its own HTTP client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(env: Arc<Environment>, user_agent: &str) -> Result<Self, ImageError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ImageError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, env))
    }

    /// Creates a pipeline around an existing client.
    #[must_use]
    pub fn with_client(client: Client, env: Arc<Environment>) -> Self {
        let origin = env.page_origin.origin().ascii_serialization();
        Self {
            client,
            env,
            origin,
        }
    }

    /// Returns the environment.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Performs one request, reading the whole body before the deadline.
    ///
    /// # Errors
    /// Returns [`ImageError::Timeout`] past the deadline,
    /// [`ImageError::NetworkFailure`] on transport errors or non-success
    /// statuses, and [`ImageError::EmptyPayload`] for a zero-length body.
    pub async fn fetch_once(
        &self,
        url: &Url,
        mode: RequestMode,
        timeout: Duration,
    ) -> Result<FetchedResponse, ImageError> {
        trace!(url = %url, ?mode, "Requesting image");
        match tokio::time::timeout(timeout, self.request(url, mode)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %url, timeout_ms = timeout.as_millis(), "Image request timed out");
                Err(ImageError::timeout(timeout))
            }
        }
    }

    async fn request(&self, url: &Url, mode: RequestMode) -> Result<FetchedResponse, ImageError> {
        let mut request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, ACCEPT_IMAGES);
        if mode == RequestMode::Credentialed {
            request = request
                .header(header::ORIGIN, &self.origin)
                .header(header::CACHE_CONTROL, "no-cache");
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ImageError::Timeout { elapsed_ms: 0 }
            } else if e.is_connect() {
                ImageError::network(format!("failed to connect: {e}"))
            } else {
                ImageError::network(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let cors_allowed = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "*" || v == self.origin);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::network(format!("failed to read body: {e}")))?;
        if bytes.is_empty() {
            return Err(ImageError::EmptyPayload);
        }

        debug!(url = %url, bytes = bytes.len(), cors_allowed, "Image response received");
        Ok(FetchedResponse {
            payload: ImagePayload::new(bytes, content_type.as_deref()),
            cors_allowed,
        })
    }
}
