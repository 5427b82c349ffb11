//! Shared relay state.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::redirect::{Attempt, Policy};
use tracing::warn;

use super::error::RelayError;
use crate::domain::entities::AllowList;

/// Redirect hops followed before the relay gives up.
pub const MAX_REDIRECTS: usize = 5;

/// Follows a redirect only while every hop stays on the allow-list.
fn redirect_policy(allow_list: Arc<AllowList>) -> Policy {
    Policy::custom(move |attempt: Attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.stop()
        } else if allow_list.permits(attempt.url()) {
            attempt.follow()
        } else {
            let host = attempt.url().host_str().unwrap_or_default().to_string();
            warn!(host = %host, "Refusing redirect to unlisted host");
            attempt.error(host)
        }
    })
}

/// Everything a relay request needs, cheap to clone per request.
#[derive(Debug, Clone)]
pub struct RelayState {
    /// Upstream HTTP client.
    pub client: Client,
    /// Hosts the relay may fetch from.
    pub allow_list: Arc<AllowList>,
    /// Deadline for the upstream to answer.
    pub timeout: Duration,
    /// Route path the relay is mounted on.
    pub path: String,
}

impl RelayState {
    /// Creates relay state with its own HTTP client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        allow_list: AllowList,
        timeout: Duration,
        user_agent: &str,
        path: impl Into<String>,
    ) -> Result<Self, RelayError> {
        let allow_list = Arc::new(allow_list);
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(redirect_policy(allow_list.clone()))
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_list,
            timeout,
            path: path.into(),
        })
    }
}
