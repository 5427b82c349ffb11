//! Resolved image payloads.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use super::attempt::StrategyKind;
use super::reference::{ReferenceKey, is_data_payload};

/// Content type assumed when an upstream does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Raw image bytes plus their declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Bytes,
    content_type: String,
}

impl ImagePayload {
    /// Creates a payload, defaulting the content type when absent or blank.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        let content_type = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    /// Returns the payload bytes.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Returns the content type without parameters.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if there are no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Encodes the payload as a self-contained `data:` URI.
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }

    /// Decodes a base64 `data:` URI.
    ///
    /// Returns `None` for anything that is not a well-formed base64 data URI.
    #[must_use]
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let uri = uri.trim();
        if !is_data_payload(uri) {
            return None;
        }
        let (meta, data) = uri["data:".len()..].split_once(',')?;
        let mut parts = meta.split(';');
        let media_type = parts.next().map(str::trim).filter(|m| !m.is_empty());
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return None;
        }
        let bytes = STANDARD.decode(data.trim()).ok()?;
        Some(Self::new(bytes, media_type))
    }

    /// Suggested file extension for the content type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            _ => "jpg",
        }
    }
}

/// Where a loaded image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Served from the in-memory cache.
    MemoryCache,
    /// Fetched over the network.
    Network,
    /// Decoded from an inline `data:` reference.
    Inline,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::Network => write!(f, "network"),
            Self::Inline => write!(f, "inline"),
        }
    }
}

/// An image ready for display.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Normalized reference.
    pub key: ReferenceKey,
    /// Payload bytes.
    pub payload: Arc<ImagePayload>,
    /// Where it came from.
    pub source: ImageSource,
    /// Strategy that produced a network result.
    pub strategy: Option<StrategyKind>,
}

impl LoadedImage {
    /// Returns the payload as a `data:` URI for embedding.
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        self.payload.to_data_uri()
    }
}
