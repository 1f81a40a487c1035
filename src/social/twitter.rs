use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Url};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;

use super::{PublishOutcome, Publisher};
use crate::config::optional_secret;

/// OAuth 1.0a user-context credentials.
#[derive(Clone)]
pub struct TwitterCredentials {
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub access_token: SecretString,
    pub access_secret: SecretString,
}

impl TwitterCredentials {
    /// `None` unless all four variables are set.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: optional_secret("TWITTER_API_KEY")?,
            api_secret: optional_secret("TWITTER_API_SECRET")?,
            access_token: optional_secret("TWITTER_ACCESS_TOKEN")?,
            access_secret: optional_secret("TWITTER_ACCESS_SECRET")?,
        })
    }
}

#[derive(Clone)]
pub struct TwitterClient {
    client: Client,
    creds: TwitterCredentials,
    api_url: String,
}

impl TwitterClient {
    pub fn new(creds: TwitterCredentials, api_url: String) -> Self {
        Self {
            client: Client::new(),
            creds,
            api_url,
        }
    }

    /// Posts a tweet and returns its id.
    pub async fn tweet(&self, text: &str) -> anyhow::Result<String> {
        #[derive(serde::Deserialize)]
        struct Created {
            data: CreatedData,
        }
        #[derive(serde::Deserialize)]
        struct CreatedData {
            id: String,
        }

        let url = Url::parse(&format!("{}/2/tweets", self.api_url.trim_end_matches('/')))?;
        let auth = authorization_header(
            &Method::POST,
            &url,
            &[],
            &self.creds,
            &nonce(),
            chrono::Utc::now().timestamp(),
        );
        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, auth)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .context("fail sending tweet")?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            anyhow::bail!("tweet rejected with {status}: {body}");
        }
        let created: Created = crate::deserialize_payload(&body)?;
        Ok(created.data.id)
    }
}

#[async_trait]
impl Publisher for TwitterClient {
    fn name(&self) -> &'static str {
        "twitter"
    }

    async fn publish(&self, text: &str) -> anyhow::Result<PublishOutcome> {
        let post_id = self.tweet(text).await?;
        Ok(PublishOutcome::Published { post_id })
    }
}

fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Builds the `Authorization: OAuth ...` header value.
///
/// `params` are the request's query or form parameters; a JSON body does not
/// take part in the signature.
pub fn authorization_header(
    method: &Method,
    url: &Url,
    params: &[(&str, &str)],
    creds: &TwitterCredentials,
    nonce: &str,
    timestamp: i64,
) -> String {
    let timestamp = timestamp.to_string();
    let oauth = [
        ("oauth_consumer_key", creds.api_key.expose_secret()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", creds.access_token.expose_secret()),
        ("oauth_version", "1.0"),
    ];

    let mut all: Vec<(String, String)> = oauth
        .iter()
        .chain(params.iter())
        .map(|(k, v)| (encode(k), encode(v)))
        .chain(url.query_pairs().map(|(k, v)| (encode(&k), encode(&v))))
        .collect();
    all.sort();
    let param_string = all
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut base_url = url.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);
    let base = format!(
        "{}&{}&{}",
        method.as_str(),
        encode(base_url.as_str()),
        encode(&param_string)
    );
    let key = format!(
        "{}&{}",
        encode(creds.api_secret.expose_secret()),
        encode(creds.access_secret.expose_secret())
    );

    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(base.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let fields = oauth
        .iter()
        .map(|(k, v)| (*k, *v))
        .chain(std::iter::once(("oauth_signature", signature.as_str())))
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}
