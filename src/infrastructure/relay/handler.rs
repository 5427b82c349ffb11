//! Relay request handlers.

use axum::Json;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::error::RelayError;
use super::state::RelayState;
use crate::application::services::RELAY_QUERY_PARAM;
use crate::domain::entities::DEFAULT_CONTENT_TYPE;

/// Browser-facing cache policy for relayed images.
pub const RELAY_CACHE_CONTROL: &str = "public, max-age=3600";

/// Extracts and decodes the upstream URL from a raw query string.
///
/// # Errors
/// Returns [`RelayError::MissingUrl`] if the parameter is absent or empty and
/// [`RelayError::InvalidEncoding`] if it does not decode to UTF-8.
pub fn extract_target(query: Option<&str>) -> Result<String, RelayError> {
    let encoded = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .find_map(|pair| match pair.split_once('=') {
            Some((name, value)) if name == RELAY_QUERY_PARAM => Some(value),
            None if pair == RELAY_QUERY_PARAM => Some(""),
            _ => None,
        })
        .ok_or(RelayError::MissingUrl)?;

    let spaced = encoded.replace('+', " ");
    let decoded = percent_decode_str(&spaced)
        .decode_utf8()
        .map_err(|_| RelayError::InvalidEncoding)?;
    let target = decoded.trim();
    if target.is_empty() {
        return Err(RelayError::MissingUrl);
    }
    Ok(target.to_string())
}

/// Parses the target and checks it against the allow-list.
///
/// # Errors
/// Returns [`RelayError::InvalidUrl`] for anything but an absolute http(s) URL
/// and [`RelayError::DomainNotAllowed`] for unlisted hosts.
pub fn validate_target(state: &RelayState, target: &str) -> Result<Url, RelayError> {
    let url = Url::parse(target).map_err(|_| RelayError::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(RelayError::InvalidUrl);
    }
    state.allow_list.check(&url)?;
    Ok(url)
}

/// `GET <relay path>?url=<encoded>`: streams an allow-listed upstream image.
pub async fn relay_image(
    State(state): State<RelayState>,
    RawQuery(query): RawQuery,
) -> Result<Response, RelayError> {
    let target = extract_target(query.as_deref())?;
    let url = validate_target(&state, &target)?;
    debug!(url = %url, "Relaying image");

    let upstream = tokio::time::timeout(state.timeout, state.client.get(url.clone()).send())
        .await
        .map_err(|_| RelayError::Timeout)?
        .map_err(|e| {
            if e.is_timeout() {
                RelayError::Timeout
            } else if e.is_redirect() {
                RelayError::DomainNotAllowed {
                    host: std::error::Error::source(&e)
                        .map_or_else(String::new, ToString::to_string),
                }
            } else {
                RelayError::Upstream {
                    status: StatusCode::BAD_GATEWAY,
                    reason: e.to_string(),
                }
            }
        })?;

    let status = upstream.status();
    if status.is_redirection() {
        return Err(RelayError::Upstream {
            status: StatusCode::BAD_GATEWAY,
            reason: "too many redirects".to_string(),
        });
    }
    if !status.is_success() {
        return Err(RelayError::Upstream {
            status,
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        });
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    info!(url = %url, content_type = ?content_type, "Relayed image");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, RELAY_CACHE_CONTROL)
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| RelayError::Internal(e.to_string()))
}

/// `OPTIONS <relay path>`: empty success; CORS headers come from the layer.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Any other method on the relay path.
pub async fn method_not_allowed() -> RelayError {
    RelayError::MethodNotAllowed
}

/// `GET /health`.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::AllowList;
    use std::time::Duration;
    use test_case::test_case;

    fn state() -> RelayState {
        RelayState::new(
            AllowList::new(["storage.example"]),
            Duration::from_secs(10),
            "imgrelay-tests",
            "/api/relay",
        )
        .unwrap()
    }

    #[test_case(Some("url=https%3A%2F%2Fstorage.example%2Fa.png"), "https://storage.example/a.png" ; "encoded")]
    #[test_case(Some("x=1&url=https://storage.example/a.png"), "https://storage.example/a.png" ; "not first")]
    #[test_case(Some("url=https%3A%2F%2Fstorage.example%2Fa+b.png"), "https://storage.example/a b.png" ; "plus as space")]
    fn test_extract_target(query: Option<&str>, expected: &str) {
        assert_eq!(extract_target(query).unwrap(), expected);
    }

    #[test_case(None ; "no query")]
    #[test_case(Some("") ; "empty query")]
    #[test_case(Some("src=https://storage.example/a.png") ; "other param")]
    #[test_case(Some("url=") ; "empty value")]
    #[test_case(Some("url") ; "bare name")]
    fn test_missing_target(query: Option<&str>) {
        assert_eq!(extract_target(query), Err(RelayError::MissingUrl));
    }

    #[test]
    fn test_invalid_encoding() {
        assert_eq!(
            extract_target(Some("url=%FF%FE")),
            Err(RelayError::InvalidEncoding)
        );
    }

    #[test_case("not a url" ; "unparseable")]
    #[test_case("/relative/a.png" ; "relative")]
    #[test_case("ftp://storage.example/a.png" ; "scheme")]
    #[test_case("data:image/png;base64,AAAA" ; "data")]
    fn test_invalid_target(target: &str) {
        assert_eq!(validate_target(&state(), target), Err(RelayError::InvalidUrl));
    }

    #[test]
    fn test_unlisted_host_is_forbidden() {
        assert_eq!(
            validate_target(&state(), "https://evil.example/a.png"),
            Err(RelayError::DomainNotAllowed {
                host: "evil.example".to_string()
            })
        );
    }
}
