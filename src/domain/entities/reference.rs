//! Image references and their normalized cache keys.

use url::Url;

/// Query parameters that only exist to defeat caches.
/// They are stripped from the normalized form so busted and plain
/// references share one cache entry.
pub const VOLATILE_PARAMS: &[&str] = &["t", "_", "cb", "cache", "timestamp", "v"];

/// Query parameter appended when a refresh needs to bypass intermediaries.
pub const CACHE_BUSTER_PARAM: &str = "t";

const DATA_PREFIX: &str = "data:";

/// Normalized form of an [`ImageReference`], used for caching and de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceKey(String);

impl ReferenceKey {
    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short stable hex digest, usable as a file name.
    #[must_use]
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl std::fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An image reference as supplied by upstream data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    raw: String,
    key: ReferenceKey,
}

impl ImageReference {
    /// Parses a raw reference.
    ///
    /// Returns `None` for empty or whitespace-only input; there is nothing to fetch.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let key = ReferenceKey(normalize(trimmed));
        Some(Self {
            raw: trimmed.to_string(),
            key,
        })
    }

    /// Returns the trimmed raw reference.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the normalized key.
    #[must_use]
    pub const fn key(&self) -> &ReferenceKey {
        &self.key
    }

    /// Returns true if the reference already carries its payload inline.
    #[must_use]
    pub fn is_data_payload(&self) -> bool {
        is_data_payload(&self.raw)
    }

    /// Returns the raw reference with a fresh cache-busting parameter.
    ///
    /// Any existing buster is replaced rather than accumulated.
    #[must_use]
    pub fn with_cache_buster(&self, stamp: i64) -> String {
        let buster = format!("{CACHE_BUSTER_PARAM}={stamp}");
        let (without_fragment, fragment) = split_once_keep(&self.raw, '#');
        let (base, query) = split_once_keep(without_fragment, '?');

        let mut pairs: Vec<&str> = query
            .map(|q| {
                q.split('&')
                    .filter(|pair| !pair.is_empty() && param_name(pair) != CACHE_BUSTER_PARAM)
                    .collect()
            })
            .unwrap_or_default();
        pairs.push(&buster);

        let mut busted = format!("{base}?{}", pairs.join("&"));
        if let Some(fragment) = fragment {
            busted.push('#');
            busted.push_str(fragment);
        }
        busted
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Returns true if the string is an inline `data:` payload.
#[must_use]
pub fn is_data_payload(raw: &str) -> bool {
    raw.trim_start()
        .get(..DATA_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DATA_PREFIX))
}

fn normalize(trimmed: &str) -> String {
    if is_data_payload(trimmed) {
        return trimmed.to_string();
    }

    if let Ok(mut url) = Url::parse(trimmed) {
        url.set_fragment(None);
        let query = url.query().map(strip_volatile).filter(|q| !q.is_empty());
        url.set_query(query.as_deref());
        return url.to_string();
    }

    // Relative reference: same treatment without a parser.
    let (without_fragment, _) = split_once_keep(trimmed, '#');
    match split_once_keep(without_fragment, '?') {
        (base, Some(query)) => {
            let query = strip_volatile(query);
            if query.is_empty() {
                base.to_string()
            } else {
                format!("{base}?{query}")
            }
        }
        (base, None) => base.to_string(),
    }
}

fn strip_volatile(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty() && !VOLATILE_PARAMS.contains(&param_name(pair)))
        .collect::<Vec<_>>()
        .join("&")
}

fn param_name(pair: &str) -> &str {
    pair.split('=').next().unwrap_or("")
}

fn split_once_keep(s: &str, sep: char) -> (&str, Option<&str>) {
    match s.split_once(sep) {
        Some((head, tail)) => (head, Some(tail)),
        None => (s, None),
    }
}
