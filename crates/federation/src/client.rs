//! Federation HTTP client.
//!
//! Sends signed deliveries to remote inboxes and fetches remote actor
//! documents.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::signature::HttpSigner;
use sparrow_common::AppError;

/// Request timeout for deliveries and fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for federation client operations.
#[derive(Debug, thiserror::Error)]
pub enum ApClientError {
    /// Network-level failure: timeout, connection, DNS. Retryable.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Signing the outbound request failed.
    #[error("signing failed: {0}")]
    Signing(String),
    /// The target URL is unusable.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// The remote answered with a non-success status.
    #[error("remote returned {status}: {body}")]
    RemoteStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl From<AppError> for ApClientError {
    fn from(e: AppError) -> Self {
        Self::Signing(e.to_string())
    }
}

/// HTTP client for `ActivityPub` exchanges.
#[derive(Clone)]
pub struct ApClient {
    client: Client,
    user_agent: String,
}

impl ApClient {
    /// Create a new client identifying as this instance.
    pub fn new(instance_url: &str) -> Result<Self, ApClientError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            user_agent: format!("sparrow/0.1.0 (+{instance_url})"),
        })
    }

    /// POST an already-serialized payload to a remote inbox, signed.
    ///
    /// Returns the HTTP status for any answered request; `Err` is
    /// reserved for network-level failures and request assembly.
    pub async fn post_inbox(
        &self,
        inbox_url: &str,
        payload: &str,
        content_type: &str,
        signer: &HttpSigner,
    ) -> Result<u16, ApClientError> {
        let url =
            Url::parse(inbox_url).map_err(|e| ApClientError::InvalidUrl(e.to_string()))?;
        let headers = signer.sign_post(&url, payload.as_bytes(), content_type)?;

        debug!(inbox = %inbox_url, "delivering activity");

        let response = self
            .client
            .post(url)
            .headers(headers)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/activity+json, application/ld+json")
            .body(payload.to_owned())
            .send()
            .await?;

        Ok(response.status().as_u16())
    }

    /// Fetch a remote actor document.
    pub async fn fetch_actor(&self, actor_url: &str) -> Result<Value, ApClientError> {
        debug!(actor_url = %actor_url, "fetching remote actor");

        let response = self
            .client
            .get(actor_url)
            .header("User-Agent", &self.user_agent)
            .header(
                "Accept",
                "application/activity+json, application/ld+json; \
                 profile=\"https://www.w3.org/ns/activitystreams\"",
            )
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApClientError::RemoteStatus {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl ApClientError {
    /// Whether this failure is worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}
