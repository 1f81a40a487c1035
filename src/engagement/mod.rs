//! Keyword-driven account discovery and AI-screened quote posts.
//!
//! Two jobs share `target_accounts.json` and `quote_engagement_status.json`:
//!
//! * collection searches one keyword per run (round robin) and remembers
//!   authors with enough followers;
//! * engagement looks at a few remembered accounts, asks a [`Scorer`] about
//!   the newest recent tweet of each, and quotes the first one that passes.
//!   At most one post is made per run.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::EngagementConfig;
use crate::queue::next_index;
use crate::social::{PublishOutcome, Publisher};
use crate::utils::{load_json_or_default, pluralize, save_json_pretty};

pub mod rapidapi;
pub mod scorer;

pub use rapidapi::RapidApiClient;
pub use scorer::{FallbackScorer, GeminiScorer, Scorer, Verdict};

/// Tweet ids remembered to avoid quoting the same tweet twice.
pub const QUOTED_RING_CAP: usize = 100;
pub const HISTORY_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetAccount {
    pub id: String,
    pub screen_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub followers: u64,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementStatus {
    #[serde(default = "no_keyword_yet")]
    pub last_keyword_index: i64,
    #[serde(default)]
    pub quoted_tweet_ids: Vec<String>,
    #[serde(default)]
    pub history: Vec<EngagementAction>,
}

fn no_keyword_yet() -> i64 {
    -1
}

impl Default for EngagementStatus {
    fn default() -> Self {
        EngagementStatus {
            last_keyword_index: -1,
            quoted_tweet_ids: Vec::new(),
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementAction {
    pub tweet_id: String,
    pub screen_name: String,
    pub post_id: String,
    pub comment: String,
    pub score: f64,
    pub posted_at: DateTime<Utc>,
}

impl EngagementStatus {
    pub fn has_quoted(&self, tweet_id: &str) -> bool {
        self.quoted_tweet_ids.iter().any(|id| id == tweet_id)
    }

    /// Remembers a posted quote, dropping the oldest entries past the caps.
    pub fn record(&mut self, action: EngagementAction) {
        self.quoted_tweet_ids.push(action.tweet_id.clone());
        if self.quoted_tweet_ids.len() > QUOTED_RING_CAP {
            let excess = self.quoted_tweet_ids.len() - QUOTED_RING_CAP;
            self.quoted_tweet_ids.drain(..excess);
        }
        self.history.push(action);
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(..excess);
        }
    }
}

/// A tweet as returned by the Twitter proxy, reduced to what the jobs use.
///
/// The proxy is inconsistent across endpoints: author details may sit on the
/// tweet itself or under `user`/`user_info`, ids come as `tweet_id` or
/// `id_str`, and counts may be strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyTweet {
    pub id: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub screen_name: Option<String>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub followers: u64,
}

impl ProxyTweet {
    pub fn from_value(v: &Value) -> ProxyTweet {
        let user = v
            .get("user")
            .or_else(|| v.get("user_info"))
            .filter(|u| u.is_object());
        let field = |name: &str| {
            string_at(v, name).or_else(|| user.and_then(|u| string_at(u, name)))
        };
        let screen_name = field("screen_name");
        let author_id = user
            .and_then(|u| string_at(u, "id_str"))
            .or_else(|| string_at(v, "user_id_str"))
            .or_else(|| screen_name.clone());
        let followers = user
            .and_then(|u| count_at(u, "followers_count"))
            .or_else(|| count_at(v, "followers_count"))
            .unwrap_or(0);
        ProxyTweet {
            id: string_at(v, "tweet_id").or_else(|| string_at(v, "id_str")),
            text: string_at(v, "text")
                .or_else(|| string_at(v, "full_text"))
                .unwrap_or_default(),
            created_at: string_at(v, "created_at").and_then(|s| parse_tweet_date(&s)),
            screen_name,
            author_id,
            author_name: user
                .and_then(|u| string_at(u, "name"))
                .or_else(|| string_at(v, "name")),
            followers,
        }
    }
}

fn string_at(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_at(v: &Value, key: &str) -> Option<u64> {
    match v.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Accepts Twitter's `Wed Oct 10 20:19:24 +0000 2018` as well as RFC 3339.
pub fn parse_tweet_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub fn quote_text(comment: &str, screen_name: &str, tweet_id: &str) -> String {
    format!("{comment}\n\nhttps://twitter.com/{screen_name}/status/{tweet_id}")
}

/// Where tweets come from: keyword search and per-account timelines.
#[async_trait]
pub trait TweetSource: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<ProxyTweet>>;

    async fn timeline(&self, screen_name: &str) -> anyhow::Result<Vec<ProxyTweet>>;
}

/// Adds the authors of `tweets` that qualify as targets. Returns how many
/// were added.
pub fn collect_accounts(
    accounts: &mut Vec<TargetAccount>,
    tweets: &[ProxyTweet],
    config: &EngagementConfig,
    now: DateTime<Utc>,
) -> usize {
    let mut known: HashSet<String> = accounts.iter().map(|a| a.id.clone()).collect();
    let mut added = 0;
    for tweet in tweets {
        let (Some(screen_name), Some(id)) = (&tweet.screen_name, &tweet.author_id) else {
            continue;
        };
        if tweet.followers < config.min_followers {
            continue;
        }
        let lower = screen_name.to_lowercase();
        if config
            .exclude_accounts
            .iter()
            .any(|ex| lower.contains(&ex.to_lowercase()))
        {
            continue;
        }
        if !known.insert(id.clone()) {
            continue;
        }
        tracing::info!("added @{screen_name} ({} followers)", tweet.followers);
        accounts.push(TargetAccount {
            id: id.clone(),
            screen_name: screen_name.clone(),
            name: tweet.author_name.clone(),
            followers: tweet.followers,
            added_at: now,
            last_check: None,
        });
        added += 1;
    }
    added
}

/// Tweets worth considering for a quote, newest first: posted within the
/// recency window, not quoted before, free of excluded words.
pub fn candidates(
    tweets: Vec<ProxyTweet>,
    status: &EngagementStatus,
    config: &EngagementConfig,
    now: DateTime<Utc>,
) -> Vec<ProxyTweet> {
    let window = TimeDelta::hours(config.recency_hours);
    let mut candidates: Vec<ProxyTweet> = tweets
        .into_iter()
        .filter(|t| match (&t.id, t.created_at) {
            (Some(id), Some(created_at)) => {
                !status.has_quoted(id)
                    && now.signed_duration_since(created_at) <= window
                    && !config.exclude_words.iter().any(|w| t.text.contains(w.as_str()))
            }
            _ => false,
        })
        .collect();
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    candidates
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    pub keyword: Option<String>,
    pub added: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngageOutcome {
    NoAccounts,
    NothingSuitable,
    Posted { tweet_id: String, post_id: String },
    DryRun { tweet_id: String },
    Failed { tweet_id: String },
}

pub struct Engagement<'a> {
    pub config: &'a EngagementConfig,
    pub accounts_path: PathBuf,
    pub status_path: PathBuf,
    pub source: &'a dyn TweetSource,
}

impl Engagement<'_> {
    pub fn load_accounts(&self) -> Vec<TargetAccount> {
        load_json_or_default(&self.accounts_path)
    }

    pub fn load_status(&self) -> EngagementStatus {
        load_json_or_default(&self.status_path)
    }

    /// Searches the next keyword and stores the new target accounts.
    ///
    /// A failed search still advances the keyword cursor so a bad keyword
    /// cannot stall the rotation.
    pub async fn collect(&self, now: DateTime<Utc>) -> anyhow::Result<CollectReport> {
        let mut accounts = self.load_accounts();
        let mut status = self.load_status();
        let keywords = &self.config.keywords;

        let Some(index) = next_index(status.last_keyword_index, keywords.len()) else {
            tracing::warn!("no search keywords configured");
            return Ok(CollectReport {
                keyword: None,
                added: 0,
                total: accounts.len(),
            });
        };
        let keyword = &keywords[index];
        tracing::info!("searching for \"{keyword}\"");

        let tweets = match self.source.search(keyword).await {
            Ok(tweets) => tweets,
            Err(e) => {
                tracing::error!("search for \"{keyword}\" failed: {e:?}");
                Vec::new()
            }
        };
        let added = collect_accounts(&mut accounts, &tweets, self.config, now);
        tracing::info!(
            "added {added} {}, {} in total",
            pluralize("account", added),
            accounts.len()
        );
        save_json_pretty(&self.accounts_path, &accounts)?;

        status.last_keyword_index = index as i64;
        save_json_pretty(&self.status_path, &status)?;
        Ok(CollectReport {
            keyword: Some(keyword.clone()),
            added,
            total: accounts.len(),
        })
    }

    /// Checks a random sample of target accounts and quotes at most one tweet.
    ///
    /// The status file is only written after a post actually went out.
    pub async fn engage(
        &self,
        scorer: &dyn Scorer,
        publisher: &dyn Publisher,
        now: DateTime<Utc>,
    ) -> anyhow::Result<EngageOutcome> {
        let mut accounts = self.load_accounts();
        if accounts.is_empty() {
            tracing::warn!("no target accounts found, run with --collect first");
            return Ok(EngageOutcome::NoAccounts);
        }
        let mut status = self.load_status();

        let picks = {
            let mut rng = rand::thread_rng();
            let amount = self.config.targets_per_run.min(accounts.len());
            rand::seq::index::sample(&mut rng, accounts.len(), amount).into_vec()
        };

        let mut outcome = EngageOutcome::NothingSuitable;
        for idx in picks {
            let target = accounts[idx].clone();
            tracing::info!("checking timeline of @{}", target.screen_name);
            let tweets = match self.source.timeline(&target.screen_name).await {
                Ok(tweets) => tweets,
                Err(e) => {
                    tracing::error!("timeline of @{} failed: {e:?}", target.screen_name);
                    continue;
                }
            };
            accounts[idx].last_check = Some(now);

            let found = candidates(tweets, &status, self.config, now);
            let Some(best) = found.into_iter().next() else {
                tracing::info!("no recent tweets from @{}", target.screen_name);
                continue;
            };
            let Some(tweet_id) = best.id.clone() else {
                continue;
            };

            let verdict = scorer.score(&target.screen_name, &best.text).await;
            tracing::info!(
                "score {} (relevant: {}) for {tweet_id}",
                verdict.score,
                verdict.is_relevant
            );
            if !verdict.is_relevant || verdict.score < self.config.min_score as f64 {
                continue;
            }
            let Some(comment) = verdict.comment.filter(|c| !c.trim().is_empty()) else {
                tracing::warn!("relevant verdict without a comment for {tweet_id}");
                continue;
            };

            let text = quote_text(&comment, &target.screen_name, &tweet_id);
            outcome = match publisher.publish(&text).await {
                Ok(PublishOutcome::Published { post_id }) => {
                    tracing::info!("quoted {tweet_id} as {post_id}");
                    status.record(EngagementAction {
                        tweet_id: tweet_id.clone(),
                        screen_name: target.screen_name.clone(),
                        post_id: post_id.clone(),
                        comment,
                        score: verdict.score,
                        posted_at: now,
                    });
                    save_json_pretty(&self.status_path, &status)?;
                    EngageOutcome::Posted { tweet_id, post_id }
                }
                Ok(PublishOutcome::DryRun) => EngageOutcome::DryRun { tweet_id },
                Err(e) => {
                    tracing::error!("quote of {tweet_id} failed: {e:?}");
                    EngageOutcome::Failed { tweet_id }
                }
            };
            break;
        }

        save_json_pretty(&self.accounts_path, &accounts)?;
        if outcome == EngageOutcome::NothingSuitable {
            tracing::info!("no suitable tweets found in this run");
        }
        Ok(outcome)
    }
}
