//! Resolved fetch routes.

use url::Url;

/// How a reference will be fetched. Recomputed on every attempt, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedRoute {
    /// Fetch the reference as-is.
    Direct(Url),
    /// Fetch through the development path-rewriting relay.
    DevRelay(Url),
    /// Fetch through the same-origin HTTP relay.
    ProdRelay(Url),
}

impl ResolvedRoute {
    /// Returns the URL to request.
    #[must_use]
    pub const fn url(&self) -> &Url {
        match self {
            Self::Direct(url) | Self::DevRelay(url) | Self::ProdRelay(url) => url,
        }
    }

    /// Returns true if the route was rewritten to a relay.
    #[must_use]
    pub const fn is_relayed(&self) -> bool {
        !matches!(self, Self::Direct(_))
    }

    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::DevRelay(_) => "dev-relay",
            Self::ProdRelay(_) => "prod-relay",
        }
    }
}

impl std::fmt::Display for ResolvedRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.url())
    }
}
