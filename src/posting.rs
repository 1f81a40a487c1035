//! Publishing stored items, tracked by each item's per-platform posted-at
//! field.
//!
//! Items are published newest first. The store is saved right after every
//! successful publish, so a failure later in the run leaves only the items it
//! did not reach pending. A crash between a publish and that save can still
//! publish an item twice on the next run.

use chrono::Utc;
use std::time::Duration;

use crate::config::PostingPolicy;
use crate::item_store::{ItemStore, NotificationItem, Platform};
use crate::social::{PublishOutcome, Publisher};

pub const POST_HEADLINE: &str = "▼無修正紹介動画▼";

/// Appends the referral parameter, with `?` or `&` depending on whether the
/// link already has a query string.
pub fn decorate_link(link: &str, referral_id: &str) -> String {
    let sep = if link.contains('?') { '&' } else { '?' };
    format!("{link}{sep}inviter_id={referral_id}")
}

pub fn render_post(item: &NotificationItem, referral_id: &str) -> String {
    format!(
        "{POST_HEADLINE}\n\n名前：{}\n年齢：{}\n身長：{}\nバスト：{}\n\n{}",
        item.name,
        item.age,
        item.height,
        item.bust,
        decorate_link(&item.link, referral_id)
    )
}

/// Indexes of items not yet published to `platform`, newest first.
pub fn pending_newest_first(items: &[NotificationItem], platform: Platform) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, item)| item.is_pending(platform))
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostReport {
    pub pending: usize,
    pub published: usize,
    pub dry_run: usize,
    pub failed: usize,
}

pub struct ItemPoster<'a> {
    pub store: &'a ItemStore,
    pub platform: Platform,
    pub policy: PostingPolicy,
    pub drain_delay: Duration,
    pub referral_id: &'a str,
}

impl ItemPoster<'_> {
    /// Publishes pending items according to the policy.
    ///
    /// Publish failures are logged and leave the item pending. Errors are
    /// returned only when the store cannot be read or saved.
    pub async fn run(&self, publisher: &dyn Publisher) -> anyhow::Result<PostReport> {
        let mut items = self.store.load()?;
        let pending = pending_newest_first(&items, self.platform);
        let mut report = PostReport {
            pending: pending.len(),
            ..PostReport::default()
        };
        tracing::info!(
            "found {} items waiting to be posted to {}",
            pending.len(),
            self.platform
        );

        let batch = match self.policy {
            PostingPolicy::DripFeed => &pending[..pending.len().min(1)],
            PostingPolicy::DrainAll => &pending[..],
        };

        for (n, &idx) in batch.iter().enumerate() {
            if n > 0 && !self.drain_delay.is_zero() {
                tokio::time::sleep(self.drain_delay).await;
            }
            let item = &items[idx];
            tracing::info!("preparing {} post for {}", self.platform, item.name);
            let text = render_post(item, self.referral_id);

            match publisher.publish(&text).await {
                Ok(PublishOutcome::Published { post_id }) => {
                    tracing::info!("posted {} as {post_id}", item.id);
                    items[idx].mark_posted(self.platform, Utc::now());
                    self.store.save(&items)?;
                    report.published += 1;
                }
                Ok(PublishOutcome::DryRun) => report.dry_run += 1,
                Err(e) => {
                    tracing::error!("failed to post {} to {}: {e:?}", item.id, self.platform);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
