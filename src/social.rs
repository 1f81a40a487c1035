//! Publishing text posts to social platforms.

use async_trait::async_trait;

pub mod threads;
pub mod twitter;

pub use threads::ThreadsClient;
pub use twitter::{TwitterClient, TwitterCredentials};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { post_id: String },
    /// Nothing was sent; the text was only logged.
    DryRun,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, text: &str) -> anyhow::Result<PublishOutcome>;
}

/// Stand-in used when a platform's credentials are not configured.
pub struct DryRunPublisher {
    name: &'static str,
}

impl DryRunPublisher {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn publish(&self, text: &str) -> anyhow::Result<PublishOutcome> {
        tracing::info!("[DRY RUN] {} post content:\n{text}", self.name);
        Ok(PublishOutcome::DryRun)
    }
}

/// The X publisher when all four credentials are present, a dry run otherwise.
pub fn twitter_from_env(api_url: &str) -> Box<dyn Publisher> {
    match TwitterCredentials::from_env() {
        Some(creds) => Box::new(TwitterClient::new(creds, api_url.to_string())),
        None => {
            tracing::info!("Twitter credentials not found, running in DRY RUN mode");
            Box::new(DryRunPublisher::new("twitter"))
        }
    }
}
