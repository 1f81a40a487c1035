use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, SecretString};

use super::{PublishOutcome, Publisher};

/// Threads Graph API client. Publishing is two calls: create a text
/// container, then publish it.
#[derive(Clone)]
pub struct ThreadsClient {
    client: Client,
    api_url: String,
    token: SecretString,
}

#[derive(serde::Deserialize)]
struct IdResponse {
    id: String,
}

impl ThreadsClient {
    pub fn new(api_url: String, token: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_url,
            token,
        }
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> anyhow::Result<Url> {
        let mut params = params.to_vec();
        params.push(("access_token", self.token.expose_secret()));
        Ok(Url::parse_with_params(
            &format!("{}/{path}", self.api_url.trim_end_matches('/')),
            &params,
        )?)
    }

    pub async fn create_container(&self, text: &str) -> anyhow::Result<String> {
        let url = self.url("me/threads", &[("media_type", "TEXT"), ("text", text)])?;
        let resp = self.client.post(url).send().await?;
        let created: IdResponse = deserialize_response(resp)
            .await
            .context("creating Threads container")?;
        Ok(created.id)
    }

    pub async fn publish_container(&self, creation_id: &str) -> anyhow::Result<String> {
        let url = self.url("me/threads_publish", &[("creation_id", creation_id)])?;
        let resp = self.client.post(url).send().await?;
        let published: IdResponse = deserialize_response(resp)
            .await
            .context("publishing Threads container")?;
        Ok(published.id)
    }
}

#[async_trait]
impl Publisher for ThreadsClient {
    fn name(&self) -> &'static str {
        "threads"
    }

    async fn publish(&self, text: &str) -> anyhow::Result<PublishOutcome> {
        let creation_id = self.create_container(text).await?;
        tracing::info!("Threads container {creation_id} created, publishing");
        let post_id = self.publish_container(&creation_id).await?;
        Ok(PublishOutcome::Published { post_id })
    }
}

async fn deserialize_response<T>(response: Response) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    let body = response.text().await.context("Threads API request failed")?;
    if !status.is_success() {
        anyhow::bail!("Threads API returned {status}: {body}");
    }
    crate::deserialize_payload(&body).with_context(|| {
        format!(
            "Failed to deserialize value of type {}",
            std::any::type_name::<T>()
        )
    })
}
