//! The item store: an append-only, deduplicated list of scraped notification
//! items persisted as one pretty-printed JSON array.
//!
//! Items are keyed by `id` (the extracted movie link). Store order is
//! insertion order, which is what the retention cap evicts by.

use crate::utils::save_json_pretty;
use anyhow::Context as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Placeholder for an attribute the notification text did not contain.
pub const UNKNOWN: &str = "?";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NotificationItem {
    pub id: String,
    pub link: String,
    pub name: String,
    pub age: String,
    pub height: String,
    pub bust: String,
    #[serde(default, alias = "notificationDate", deserialize_with = "scalar_as_string")]
    pub notification_date: Option<String>,
    /// ISO-8601 text as written by [`timestamp`]. Older stores may hold other
    /// formats; the value is only ever copied, never parsed.
    #[serde(alias = "collectedAt", deserialize_with = "required_scalar")]
    pub collected_at: String,
    /// `None` until the item is published to X.
    #[serde(default, alias = "tweetedAt", deserialize_with = "scalar_as_string")]
    pub tweeted_at: Option<String>,
    #[serde(default, alias = "threadsPostedAt", deserialize_with = "scalar_as_string")]
    pub threads_posted_at: Option<String>,
}

/// Formats an instant the way the store records it.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Strings are kept verbatim and numbers are kept as their JSON text.
fn scalar_as_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match <Value as serde::Deserialize>::deserialize(d)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or null, found {other}"
        ))),
    }
}

fn required_scalar<'de, D>(d: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    scalar_as_string(d)?.ok_or_else(|| serde::de::Error::custom("unexpected null"))
}

/// A platform an item can be published to. Each one owns a posted-at field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Platform {
    Twitter,
    Threads,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Threads => "threads",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields extracted from one notification, before it is stamped and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub link: String,
    pub name: String,
    pub age: String,
    pub height: String,
    pub bust: String,
    pub notification_date: Option<String>,
}

impl NotificationItem {
    pub fn posted_at(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Twitter => self.tweeted_at.as_deref(),
            Platform::Threads => self.threads_posted_at.as_deref(),
        }
    }

    pub fn is_pending(&self, platform: Platform) -> bool {
        self.posted_at(platform).is_none()
    }

    /// Records a successful publish. A marker that is already set is kept as
    /// is, and `false` is returned.
    pub fn mark_posted(&mut self, platform: Platform, at: DateTime<Utc>) -> bool {
        let slot = match platform {
            Platform::Twitter => &mut self.tweeted_at,
            Platform::Threads => &mut self.threads_posted_at,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(timestamp(at));
        true
    }
}

#[derive(Debug, Clone)]
pub struct ItemStore {
    path: PathBuf,
}

impl ItemStore {
    pub fn new(path: impl Into<PathBuf>) -> ItemStore {
        ItemStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored items.
    ///
    /// A missing, blank or syntactically broken document reads as empty. A
    /// document that parses but holds a record that cannot be read is an
    /// error, so that callers never save a store with that record dropped.
    pub fn load(&self) -> anyhow::Result<Vec<NotificationItem>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        let doc: Value = match serde_json::from_str(&contents) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("{} is not valid JSON, starting empty: {e}", self.path.display());
                return Ok(Vec::new());
            }
        };
        let Value::Array(records) = doc else {
            anyhow::bail!("{} does not hold a JSON array", self.path.display());
        };
        records
            .into_iter()
            .enumerate()
            .map(|(n, record)| {
                serde_json::from_value(record)
                    .with_context(|| format!("record {n} of {}", self.path.display()))
            })
            .collect()
    }

    pub fn save(&self, items: &[NotificationItem]) -> anyhow::Result<()> {
        save_json_pretty(&self.path, items)
    }
}

/// Appends every candidate whose link is not already stored, in order.
///
/// Returns the number of items added. Candidates repeated within the same
/// batch are only added once.
pub fn append_new(
    items: &mut Vec<NotificationItem>,
    candidates: impl IntoIterator<Item = NewItem>,
    now: DateTime<Utc>,
) -> usize {
    let mut known: HashSet<String> = items.iter().map(|i| i.id.clone()).collect();
    let mut added = 0;
    for new in candidates {
        if !known.insert(new.link.clone()) {
            tracing::debug!("skipping already stored item {}", new.link);
            continue;
        }
        tracing::info!(
            "new item found: {} (date: {})",
            new.name,
            new.notification_date.as_deref().unwrap_or("unknown")
        );
        items.push(NotificationItem {
            id: new.link.clone(),
            link: new.link,
            name: new.name,
            age: new.age,
            height: new.height,
            bust: new.bust,
            notification_date: new.notification_date,
            collected_at: timestamp(now),
            tweeted_at: None,
            threads_posted_at: None,
        });
        added += 1;
    }
    added
}

/// Drops the oldest items until at most `cap` remain, whatever their posted
/// state. Returns how many were evicted.
pub fn enforce_cap(items: &mut Vec<NotificationItem>, cap: usize) -> usize {
    let excess = items.len().saturating_sub(cap);
    if excess > 0 {
        items.drain(..excess);
        tracing::info!("evicted {excess} oldest items to stay within {cap}");
    }
    excess
}

#[cfg(test)]
pub(crate) fn sample_item(n: usize) -> NotificationItem {
    let link = format!("https://delice.love/movie/{n}?openExternalBrowser=1");
    NotificationItem {
        id: link.clone(),
        link,
        name: format!("name{n}"),
        age: "20".into(),
        height: "160".into(),
        bust: "C".into(),
        notification_date: None,
        collected_at: timestamp(DateTime::from_timestamp(1_700_000_000 + n as i64, 0).unwrap()),
        tweeted_at: None,
        threads_posted_at: None,
    }
}
