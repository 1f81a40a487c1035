//! Threads access-token bookkeeping.
//!
//! The long-lived token sits in the remote record store next to the website
//! session. It is refreshed once it is more than [`REFRESH_AFTER_DAYS`] old; a
//! failed refresh keeps handing out the old token so callers can still try.

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use crate::record_store::RecordStoreClient;

pub const AUTH_TABLE: &str = "threads_auth";
pub const AUTH_TABLE_COLUMNS: &[&str] = &["id", "access_token", "last_updated"];
pub const TOKEN_RECORD_ID: &str = "threads_access_token";
pub const SESSION_RECORD_ID: &str = "delice_website_session";

/// Tokens strictly older than this many days are refreshed. Exactly ten days
/// is still fresh.
pub const REFRESH_AFTER_DAYS: i64 = 10;

pub fn should_refresh(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_updated {
        None => true,
        Some(at) => now.signed_duration_since(at) > TimeDelta::days(REFRESH_AFTER_DAYS),
    }
}

/// Parses a stored `last_updated`. Anything unparseable counts as absent.
pub fn parse_timestamp(s: Option<&str>) -> Option<DateTime<Utc>> {
    let s = s?;
    match DateTime::parse_from_rfc3339(s) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!("unparseable last_updated {s:?}: {e}");
            None
        }
    }
}

/// The `access_token` / `last_updated` pair written for auth records.
pub fn token_fields(token: &str, now: DateTime<Utc>) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("access_token".into(), Value::String(token.to_string()));
    fields.insert("last_updated".into(), Value::String(now.to_rfc3339()));
    fields
}

#[async_trait]
pub trait TokenRefresher {
    async fn refresh(&self, token: &str) -> anyhow::Result<String>;
}

pub struct ThreadsTokenRefresher {
    client: Client,
    refresh_url: String,
}

impl ThreadsTokenRefresher {
    pub fn new(refresh_url: String) -> Self {
        Self {
            client: Client::new(),
            refresh_url,
        }
    }
}

#[async_trait]
impl TokenRefresher for ThreadsTokenRefresher {
    async fn refresh(&self, token: &str) -> anyhow::Result<String> {
        #[derive(serde::Deserialize)]
        struct Refreshed {
            access_token: Option<String>,
        }

        let url = Url::parse_with_params(
            &self.refresh_url,
            &[("grant_type", "th_refresh_token"), ("access_token", token)],
        )?;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await.context("reading refresh response")?;
        if !status.is_success() {
            anyhow::bail!("refresh returned {status}: {body}");
        }
        let refreshed: Refreshed = crate::deserialize_payload(&body)?;
        refreshed
            .access_token
            .filter(|t| !t.is_empty())
            .context("refresh response carried no access_token")
    }
}

pub struct TokenProvider<'a, R> {
    store: &'a RecordStoreClient,
    refresher: R,
    initial_token: Option<SecretString>,
}

impl<'a, R: TokenRefresher> TokenProvider<'a, R> {
    pub fn new(store: &'a RecordStoreClient, refresher: R, initial_token: Option<SecretString>) -> Self {
        Self {
            store,
            refresher,
            initial_token,
        }
    }

    /// Returns the token to publish with, refreshing it first when stale.
    ///
    /// `Ok(None)` means no token exists anywhere. Errors are failures to write
    /// a refreshed token back.
    pub async fn access_token(&self, now: DateTime<Utc>) -> anyhow::Result<Option<SecretString>> {
        self.ensure_table(now).await;

        let Some(record) = self.store.find_record(AUTH_TABLE, TOKEN_RECORD_ID).await else {
            tracing::warn!("token record not found, using the initial token");
            return Ok(self.initial_token.clone());
        };
        let Some(token) = record.get_str("access_token") else {
            tracing::warn!("token record has no access_token, using the initial token");
            return Ok(self.initial_token.clone());
        };
        let last_updated = parse_timestamp(record.get_str("last_updated"));

        if !should_refresh(last_updated, now) {
            return Ok(Some(token.to_string().into()));
        }

        tracing::info!("token is stale, refreshing");
        match self.refresher.refresh(token).await {
            Ok(fresh) => {
                self.store
                    .update_record(AUTH_TABLE, TOKEN_RECORD_ID, Value::Object(token_fields(&fresh, now)))
                    .await?;
                tracing::info!("token refreshed");
                Ok(Some(fresh.into()))
            }
            Err(e) => {
                tracing::error!("failed to refresh token, using the old one: {e:?}");
                Ok(Some(token.to_string().into()))
            }
        }
    }

    // Creates the table and seeds the initial token when the table is absent
    // or empty. Failures are warnings: the table may already exist.
    async fn ensure_table(&self, now: DateTime<Utc>) {
        let missing = self
            .store
            .get_table_data(AUTH_TABLE, None)
            .await
            .is_none_or(|t| t.is_missing_or_empty());
        if !missing {
            return;
        }

        tracing::info!("table `{AUTH_TABLE}` missing or empty, initializing");
        if let Err(e) = self.store.create_table(AUTH_TABLE, AUTH_TABLE_COLUMNS).await {
            tracing::warn!("create_table failed (it may already exist): {e:?}");
        }
        let Some(initial) = &self.initial_token else {
            tracing::warn!("THREADS_INITIAL_TOKEN is not set, nothing to seed");
            return;
        };
        let mut data = token_fields(initial.expose_secret(), now);
        data.insert("id".into(), json!(TOKEN_RECORD_ID));
        if let Err(e) = self.store.create_record(AUTH_TABLE, Value::Object(data)).await {
            tracing::warn!("seeding the initial token failed: {e:?}");
        }
    }
}
