use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{ProxyTweet, TweetSource};
use crate::config::{ConfigurationError, required_secret};

/// Client for the RapidAPI-hosted Twitter proxy (`twitter-api45`).
#[derive(Clone)]
pub struct RapidApiClient {
    client: Client,
    base_url: String,
    host: String,
    key: SecretString,
}

impl RapidApiClient {
    /// Reads `RAPIDAPI_KEY`; `RAPIDAPI_HOST` overrides the configured host.
    pub fn new_from_env(host: &str) -> Result<Self, ConfigurationError> {
        let key = required_secret("RAPIDAPI_KEY")?;
        let host = std::env::var("RAPIDAPI_HOST").unwrap_or_else(|_| host.to_string());
        Ok(Self::new(format!("https://{host}"), host, key))
    }

    pub fn new(base_url: String, host: String, key: SecretString) -> Self {
        Self {
            client: Client::new(),
            base_url,
            host,
            key,
        }
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> anyhow::Result<Value> {
        let url = format!("{}/{endpoint}", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(params)
            .header("x-rapidapi-key", self.key.expose_secret())
            .header("x-rapidapi-host", &self.host)
            .send()
            .await
            .with_context(|| format!("{endpoint} request failed"))?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            anyhow::bail!("{endpoint} returned {status}: {body}");
        }
        crate::deserialize_payload(&body)
    }
}

/// The tweet list of a search or timeline response, found under `timeline`
/// or `tweets`.
pub fn tweets_of(response: &Value) -> Vec<ProxyTweet> {
    response
        .get("timeline")
        .and_then(Value::as_array)
        .or_else(|| response.get("tweets").and_then(Value::as_array))
        .map(|tweets| tweets.iter().map(ProxyTweet::from_value).collect())
        .unwrap_or_default()
}

#[async_trait]
impl TweetSource for RapidApiClient {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<ProxyTweet>> {
        let response = self
            .get("search.php", &[("query", query), ("search_type", "Top")])
            .await?;
        Ok(tweets_of(&response))
    }

    async fn timeline(&self, screen_name: &str) -> anyhow::Result<Vec<ProxyTweet>> {
        let response = self
            .get("timeline.php", &[("screenname", screen_name)])
            .await?;
        Ok(tweets_of(&response))
    }
}
