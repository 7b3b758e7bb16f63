//! Client for counter actors hosted by a separate Gatekeeper service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::trace;

use super::backend::CounterBackend;
use super::counter::Decision;
use super::key::RateLimitKey;
use super::policy::RateLimitPolicy;
use crate::error::{GatekeeperError, Result};

/// Counter actors reached over HTTP.
///
/// Every failure (connect, timeout, non-2xx, undecodable body) surfaces as
/// a [`GatekeeperError`] so callers can apply their own failure policy.
#[derive(Debug, Clone)]
pub struct RemoteCounters {
    client: Client,
    base_url: Url,
}

impl RemoteCounters {
    /// Create a client for the counter service at `base_url`.
    ///
    /// `timeout` bounds each individual HTTP exchange.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatekeeperError::Config(format!("Invalid counter service URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatekeeperError::Config(format!(
                "Counter service URL cannot be a base: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, key: &RateLimitKey, operation: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                GatekeeperError::Config("Counter service URL cannot be a base".to_string())
            })?
            .pop_if_empty()
            .extend(["v1", "counters", key.as_str(), operation]);
        Ok(url)
    }
}

#[async_trait]
impl CounterBackend for RemoteCounters {
    async fn check(&self, key: &RateLimitKey, policy: RateLimitPolicy) -> Result<Decision> {
        let url = self.endpoint(key, "check")?;
        trace!(key = %key, url = %url, "Calling remote counter");

        let response = self.client.post(url).json(&policy).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatekeeperError::Backend(format!(
                "counter service answered {} for check",
                status
            )));
        }

        response
            .json::<Decision>()
            .await
            .map_err(|e| GatekeeperError::MalformedResponse(e.to_string()))
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<()> {
        let url = self.endpoint(key, "reset")?;
        let status = self.client.post(url).send().await?.status();

        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(GatekeeperError::Backend(
                "counter service has no reset endpoint".to_string(),
            )),
            s => Err(GatekeeperError::Backend(format!(
                "counter service answered {} for reset",
                s
            ))),
        }
    }
}
