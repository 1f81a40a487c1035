//! The logged-in website session.
//!
//! Logging in happens in a real browser elsewhere; what reaches us is that
//! browser's storage-state document (`{"cookies": [...], "origins": [...]}`).
//! We replay its cookies on a plain HTTP request for the notification page.

use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, USER_AGENT};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;

use crate::config::ConfigurationError;
use crate::record_store::RecordStoreClient;
use crate::token::{AUTH_TABLE, SESSION_RECORD_ID};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    /// Seconds since the epoch; `-1` for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
}

fn root_path() -> String {
    "/".to_string()
}

impl Cookie {
    fn matches(&self, url: &Url, now_secs: f64) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let domain = self.domain.trim_start_matches('.');
        let domain_ok = host.eq_ignore_ascii_case(domain)
            || host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", domain.to_ascii_lowercase()));
        let path_ok = url.path().starts_with(self.path.trim_end_matches('/')) || self.path == "/";
        let secure_ok = !self.secure || url.scheme() == "https";
        let live = match self.expires {
            Some(exp) if exp > 0.0 => exp > now_secs,
            _ => true,
        };
        domain_ok && path_ok && secure_ok && live
    }
}

impl StorageState {
    pub fn parse(json: &str) -> anyhow::Result<StorageState> {
        crate::deserialize_payload(json).context("session is not a storage-state document")
    }

    pub fn from_base64(encoded: &str) -> anyhow::Result<StorageState> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .context("session is not valid base64")?;
        let json = String::from_utf8(bytes).context("session is not UTF-8")?;
        StorageState::parse(&json)
    }

    /// The `Cookie` header for a request to `url`, if any cookie applies.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let now = chrono::Utc::now().timestamp() as f64;
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches(url, now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

/// Finds the session: `AUTH_JSON_BASE64`, then the local storage-state file,
/// then the record uploaded to the remote store.
pub async fn resolve(
    env_base64: Option<&SecretString>,
    auth_file: &Path,
    remote: Option<&RecordStoreClient>,
) -> anyhow::Result<StorageState> {
    if let Some(encoded) = env_base64 {
        let state = StorageState::from_base64(encoded.expose_secret())
            .context("failed to decode AUTH_JSON_BASE64")?;
        tracing::info!("using session from AUTH_JSON_BASE64");
        return Ok(state);
    }

    if auth_file.exists() {
        let json = std::fs::read_to_string(auth_file)
            .with_context(|| format!("reading {}", auth_file.display()))?;
        tracing::info!("using session from {}", auth_file.display());
        return StorageState::parse(&json);
    }

    if let Some(remote) = remote {
        if let Some(record) = remote.find_record(AUTH_TABLE, SESSION_RECORD_ID).await {
            if let Some(json) = record.get_str("access_token") {
                tracing::info!("using session from record `{SESSION_RECORD_ID}`");
                return StorageState::parse(json);
            }
        }
    }

    Err(ConfigurationError::MissingSession.into())
}

#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub async fn fetch(&self, url: &Url, session: &StorageState) -> anyhow::Result<String> {
        tracing::info!("fetching {url}");
        let mut req = self
            .client
            .get(url.clone())
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html")
            .header(ACCEPT_LANGUAGE, "ja,en;q=0.8");
        match session.cookie_header(url) {
            Some(cookies) => req = req.header(COOKIE, cookies),
            None => tracing::warn!("no session cookie applies to {url}"),
        }
        let resp = req.send().await.with_context(|| format!("fetching {url}"))?;
        let status = resp.status();
        let body = resp.text().await.context("reading page body")?;
        if !status.is_success() {
            anyhow::bail!("{url} returned {status}");
        }
        Ok(body)
    }
}
