//! Runtime environment injected into the resolver and loaders.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::errors::ImageError;

/// Where the process is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    /// Local development, served through a path-rewriting relay.
    Development,
    /// Hosted platform, served through the same-origin HTTP relay.
    #[default]
    Hosted,
}

impl EnvironmentMode {
    /// Default timeout for a single fetch attempt.
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        match self {
            Self::Development => Duration::from_secs(10),
            Self::Hosted => Duration::from_secs(30),
        }
    }

    /// Default number of retry attempts.
    #[must_use]
    pub const fn default_max_attempts(self) -> u32 {
        match self {
            Self::Development => 3,
            Self::Hosted => 5,
        }
    }

    /// Default batch size for concurrent loads.
    #[must_use]
    pub const fn default_batch_size(self) -> usize {
        match self {
            Self::Development => 3,
            Self::Hosted => 2,
        }
    }
}

impl std::fmt::Display for EnvironmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Hosted => write!(f, "hosted"),
        }
    }
}

/// Set of upstream hosts the relay may be pointed at.
///
/// Matching is exact on the lowercase host name; subdomains are not implied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    hosts: HashSet<String>,
}

impl AllowList {
    /// Creates an allow-list from host names.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Returns true if the host is allow-listed.
    #[must_use]
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_ascii_lowercase())
    }

    /// Returns true if the URL's host is allow-listed.
    #[must_use]
    pub fn permits(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| self.contains(host))
    }

    /// Checks a URL against the allow-list.
    ///
    /// # Errors
    /// Returns [`ImageError::DomainRejected`] if the host is missing or not listed.
    pub fn check(&self, url: &Url) -> Result<(), ImageError> {
        if self.permits(url) {
            Ok(())
        } else {
            Err(ImageError::domain_rejected(url.host_str().unwrap_or("")))
        }
    }

    /// Returns the number of hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns true if no host is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Environment value object passed explicitly to every component that routes requests.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Development or hosted.
    pub mode: EnvironmentMode,
    /// Origin of the page that embeds the images.
    pub page_origin: Url,
    /// Hosts whose references are rewritten to a relay.
    pub allowed_hosts: AllowList,
    /// Path prefix forwarded by the development relay.
    pub dev_relay_prefix: String,
    /// Path of the same-origin HTTP relay.
    pub relay_path: String,
}

impl Environment {
    /// Creates an environment with the conventional relay paths.
    #[must_use]
    pub fn new(mode: EnvironmentMode, page_origin: Url, allowed_hosts: AllowList) -> Self {
        Self {
            mode,
            page_origin,
            allowed_hosts,
            dev_relay_prefix: "/storage-proxy".to_string(),
            relay_path: "/api/relay".to_string(),
        }
    }

    /// Sets the development relay prefix.
    #[must_use]
    pub fn with_dev_relay_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dev_relay_prefix = prefix.into();
        self
    }

    /// Sets the hosted relay path.
    #[must_use]
    pub fn with_relay_path(mut self, path: impl Into<String>) -> Self {
        self.relay_path = path.into();
        self
    }

    /// Returns true in local development.
    #[must_use]
    pub const fn is_development(&self) -> bool {
        matches!(self.mode, EnvironmentMode::Development)
    }

    /// Returns true if the URL shares the page origin.
    #[must_use]
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.page_origin.origin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_is_exact_and_case_insensitive() {
        let list = AllowList::new(["Storage.Example.com", " "]);
        assert_eq!(list.len(), 1);
        assert!(list.contains("storage.example.com"));
        assert!(list.contains("STORAGE.example.com"));
        assert!(!list.contains("evil.storage.example.com"));
        assert!(!list.contains("example.com"));
    }

    #[test]
    fn test_check_rejects_unlisted_host() {
        let list = AllowList::new(["allowed.example"]);
        let url = Url::parse("https://evil.example/a.png").unwrap();
        assert_eq!(
            list.check(&url),
            Err(ImageError::domain_rejected("evil.example"))
        );
    }

    #[test]
    fn test_mode_defaults() {
        assert_eq!(
            EnvironmentMode::Development.default_timeout(),
            Duration::from_secs(10)
        );
        assert_eq!(EnvironmentMode::Hosted.default_max_attempts(), 5);
        assert!(EnvironmentMode::Hosted.default_batch_size() < 3);
    }
}
