//! Read-only client for the Pulse social feed.
//!
//! Responses are wrapped as `{"status": "...", "payload": {...}}`; the
//! payload is returned as plain JSON since the front-end renders it as is.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;

use mojarung_shared::{InvestConfig, MojarungError, Result};

/// Posts requested per page.
const PAGE_SIZE: usize = 30;

pub struct PulseClient {
    client: reqwest::Client,
    base_url: Url,
}

impl PulseClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MojarungError::Brokerage(format!("failed to build HTTP client: {e}")))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| MojarungError::config(format!("invalid Pulse URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(MojarungError::config(format!(
                "invalid Pulse URL '{base_url}': not a base URL"
            )));
        }
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &InvestConfig) -> Result<Self> {
        Self::new(
            &config.pulse_base_url,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Base URL with `segments` appended, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| MojarungError::config(format!("{} is not a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_payload(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint(segments)?;
        debug!(%url, "pulse request");

        let response = self
            .client
            .get(url.clone())
            .query(&[("appName", "invest"), ("platform", "web")])
            .query(query)
            .send()
            .await
            .map_err(|e| MojarungError::Brokerage(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MojarungError::Brokerage(format!("{url}: HTTP {status}")));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| MojarungError::Brokerage(format!("{url}: invalid response: {e}")))?;

        match body.get_mut("payload").map(Value::take) {
            Some(payload) if !payload.is_null() => Ok(payload),
            _ => Err(MojarungError::Brokerage(format!("{url}: response has no payload"))),
        }
    }

    /// Profile by nickname.
    pub async fn user_info(&self, nickname: &str) -> Result<Value> {
        self.get_payload(&["profile", "nickname", nickname], &[])
            .await
    }

    /// Latest posts of a profile.
    pub async fn user_posts(&self, profile_id: &str) -> Result<Value> {
        self.get_payload(
            &["profile", profile_id, "post"],
            &[("limit", PAGE_SIZE.to_string())],
        )
        .await
    }

    /// Posts mentioning a ticker, `items` truncated to `limit` when positive.
    pub async fn ticker_posts(&self, ticker: &str, limit: usize) -> Result<Value> {
        let mut payload = self
            .get_payload(
                &["post", "instrument", ticker],
                &[("limit", PAGE_SIZE.to_string())],
            )
            .await?;
        if limit > 0 {
            if let Some(items) = payload.get_mut("items").and_then(Value::as_array_mut) {
                items.truncate(limit);
            }
        }
        Ok(payload)
    }
}
