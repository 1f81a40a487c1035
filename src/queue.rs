//! A circular queue of canned posts.
//!
//! Entries are the non-blank lines of a text file. `tweets_status.json`
//! remembers the index of the last entry published; each run publishes the
//! one after it, wrapping back to the first entry after the last.

use std::path::PathBuf;

use crate::social::{PublishOutcome, Publisher};
use crate::utils::{load_json_or_default, save_json_pretty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueueStatus {
    /// `-1` until something has been published.
    #[serde(rename = "lastIndex", default = "nothing_posted", deserialize_with = "null_as_nothing")]
    pub last_index: i64,
}

fn nothing_posted() -> i64 {
    -1
}

fn null_as_nothing<'de, D>(d: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v: Option<i64> = serde::Deserialize::deserialize(d)?;
    Ok(v.unwrap_or(-1))
}

impl Default for QueueStatus {
    fn default() -> Self {
        QueueStatus { last_index: -1 }
    }
}

pub fn parse_entries(doc: &str) -> Vec<String> {
    doc.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// `(last_index + 1) mod len`, or `None` for an empty queue.
pub fn next_index(last_index: i64, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(last_index.saturating_add(1).rem_euclid(len as i64) as usize)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    Empty,
    Published { index: usize, post_id: String },
    DryRun { index: usize },
    Failed { index: usize },
}

pub struct PostQueue {
    pub entries_path: PathBuf,
    pub status_path: PathBuf,
}

impl PostQueue {
    pub fn load_entries(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.entries_path) {
            Ok(doc) => parse_entries(&doc),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("failed to read {}: {e}", self.entries_path.display());
                }
                Vec::new()
            }
        }
    }

    pub fn load_status(&self) -> QueueStatus {
        load_json_or_default(&self.status_path)
    }

    pub fn save_status(&self, status: QueueStatus) -> anyhow::Result<()> {
        save_json_pretty(&self.status_path, &status)
    }

    /// Publishes the next entry. The cursor only advances after a successful
    /// publish.
    pub async fn post_next(&self, publisher: &dyn Publisher) -> anyhow::Result<QueueOutcome> {
        let entries = self.load_entries();
        tracing::info!("loaded {} entries from queue", entries.len());
        let status = self.load_status();
        tracing::info!("last posted index: {}", status.last_index);

        let Some(index) = next_index(status.last_index, entries.len()) else {
            tracing::info!("no entries in queue");
            return Ok(QueueOutcome::Empty);
        };
        if index == 0 && status.last_index >= 0 {
            tracing::info!("reached end of queue, starting from the beginning");
        }
        let text = &entries[index];
        tracing::info!(
            "next entry (index {index}): {}...",
            text.chars().take(50).collect::<String>()
        );

        match publisher.publish(text).await {
            Ok(PublishOutcome::Published { post_id }) => {
                self.save_status(QueueStatus {
                    last_index: index as i64,
                })?;
                tracing::info!("posted entry {index} as {post_id}");
                Ok(QueueOutcome::Published { index, post_id })
            }
            Ok(PublishOutcome::DryRun) => {
                tracing::info!("[DRY RUN] would update lastIndex to {index}");
                Ok(QueueOutcome::DryRun { index })
            }
            Err(e) => {
                tracing::error!("failed to post entry {index}: {e:?}");
                Ok(QueueOutcome::Failed { index })
            }
        }
    }
}
