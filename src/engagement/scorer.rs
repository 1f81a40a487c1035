//! Deciding whether a tweet is worth quoting, and with what comment.

use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::sync::LazyLock;

use crate::config::{EngagementConfig, optional_secret};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Verdict {
    #[serde(rename = "isRelevant", default)]
    pub is_relevant: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Verdict {
    pub fn rejected() -> Verdict {
        Verdict {
            is_relevant: false,
            score: 0.0,
            reason: None,
            comment: None,
        }
    }
}

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Never fails: problems talking to a model come back as a rejection.
    async fn score(&self, screen_name: &str, text: &str) -> Verdict;
}

/// Used when no model is configured. Its score sits below the default
/// threshold, so on its own it never causes a post.
pub struct FallbackScorer;

pub const FALLBACK_COMMENT: &str = "これは刺さる...メモした📝";

#[async_trait]
impl Scorer for FallbackScorer {
    async fn score(&self, _screen_name: &str, _text: &str) -> Verdict {
        Verdict {
            is_relevant: true,
            score: 50.0,
            reason: None,
            comment: Some(FALLBACK_COMMENT.to_string()),
        }
    }
}

/// Gemini `generateContent` client.
pub struct GeminiScorer {
    client: Client,
    api_url: String,
    model: String,
    api_key: SecretString,
    concept: String,
}

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

impl GeminiScorer {
    pub fn new(config: &EngagementConfig, api_key: SecretString) -> Self {
        GeminiScorer {
            client: Client::new(),
            api_url: config.gemini_api_url.clone(),
            model: config.gemini_model.clone(),
            api_key,
            concept: config.account_concept.clone(),
        }
    }

    fn prompt(&self, screen_name: &str, text: &str) -> String {
        format!(
            "You review tweets for a social media account and write quote comments.\n\n\
             Account concept:\n{}\n\n\
             Tweet:\n@{screen_name}: {text}\n\n\
             1. Decide whether quoting this tweet fits the account's audience. \
             Advertising, spam and negative content never fit.\n\
             2. If it fits, write a friendly Japanese comment of 80 to 110 characters \
             that says concretely why the tweet resonates.\n\n\
             Answer with JSON only: \
             {{\"isRelevant\": bool, \"score\": 0-100, \"reason\": \"...\", \"comment\": \"...\"}}",
            self.concept.trim()
        )
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(serde::Deserialize)]
        struct Candidate {
            content: Content,
        }
        #[derive(serde::Deserialize)]
        struct Content {
            #[serde(default)]
            parts: Vec<Part>,
        }
        #[derive(serde::Deserialize)]
        struct Part {
            #[serde(default)]
            text: String,
        }

        let url = format!(
            "{}/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        );
        let resp = self
            .client
            .post(url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&serde_json::json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await
            .context("generateContent request failed")?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            anyhow::bail!("generateContent returned {status}: {body}");
        }
        let response: Response = crate::deserialize_payload(&body)?;
        Ok(response
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .map(|p| p.text)
            .collect())
    }
}

/// Pulls the first `{...}` span out of model output and reads it as a
/// verdict.
pub fn parse_verdict(output: &str) -> anyhow::Result<Verdict> {
    let Some(m) = JSON_OBJECT.find(output) else {
        anyhow::bail!("no JSON object in model output");
    };
    crate::deserialize_payload(m.as_str())
}

#[async_trait]
impl Scorer for GeminiScorer {
    async fn score(&self, screen_name: &str, text: &str) -> Verdict {
        let prompt = self.prompt(screen_name, text);
        match self.generate(&prompt).await.and_then(|out| parse_verdict(&out)) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!("scoring failed: {e:?}");
                Verdict::rejected()
            }
        }
    }
}

/// Gemini when `GEMINI_API_KEY` is set, the fallback otherwise.
pub fn scorer_from_env(config: &EngagementConfig) -> Box<dyn Scorer> {
    match optional_secret("GEMINI_API_KEY") {
        Some(key) => Box::new(GeminiScorer::new(config, key)),
        None => {
            tracing::info!("GEMINI_API_KEY not set, using the fallback verdict");
            Box::new(FallbackScorer)
        }
    }
}
