//! Notification ingestion.
//!
//! The notification page is a server-rendered Next.js page; its data lives in
//! the `__NEXT_DATA__` script element as a dehydrated react-query cache. We
//! pick the query that holds notifications, pull the movie link and profile
//! attributes out of each notification's free text, and append unseen items
//! to the [`ItemStore`](crate::item_store::ItemStore).

use crate::item_store::{self, NewItem, NotificationItem, UNKNOWN};
use crate::utils::pluralize;
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static NEXT_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*\bid=["']__NEXT_DATA__["'][^>]*>(.*?)</script>"#).unwrap()
});

/// Returns the JSON document embedded in the page's `__NEXT_DATA__` element.
///
/// A page without it (logged out, maintenance page, ...) is an error: there
/// is nothing meaningful to ingest.
pub fn extract_next_data(html: &str) -> anyhow::Result<Value> {
    let caps = NEXT_DATA
        .captures(html)
        .context("could not find __NEXT_DATA__ on the page")?;
    crate::deserialize_payload::<Value>(caps[1].trim()).context("__NEXT_DATA__ is not valid JSON")
}

/// One raw record of the notification list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNotification {
    pub detail: String,
    pub send_date: Option<String>,
}

impl RawNotification {
    fn from_value(v: &Value) -> RawNotification {
        RawNotification {
            detail: v
                .get("detail")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            send_date: match v.get("send_date") {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        }
    }
}

/// Finds the notification list among the dehydrated queries.
///
/// The page carries many unrelated queries; the notification one is the first
/// whose `state.data.pages[0].data` is a non-empty array whose first element
/// has a `title`. No match yields an empty list.
pub fn locate_notifications(payload: &Value) -> Vec<RawNotification> {
    let Some(queries) = payload
        .pointer("/props/pageProps/dehydratedState/queries")
        .and_then(Value::as_array)
    else {
        tracing::warn!("payload has no props.pageProps.dehydratedState.queries");
        return Vec::new();
    };

    for query in queries {
        let Some(records) = query
            .pointer("/state/data/pages/0/data")
            .and_then(Value::as_array)
        else {
            continue;
        };
        let has_title = records
            .first()
            .and_then(|first| first.get("title"))
            .is_some_and(is_truthy);
        if has_title {
            return records.iter().map(RawNotification::from_value).collect();
        }
    }
    Vec::new()
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Age,
    Height,
    Bust,
}

/// One labelled attribute of the notification text.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: Field,
    /// Must contain one capture group holding the value.
    pub pattern: Regex,
    /// Value used when the pattern does not match. `None` makes the field
    /// required: the record is discarded without it.
    pub default: Option<&'static str>,
}

impl FieldRule {
    fn labelled(field: Field, label: &str, value: &str, default: Option<&'static str>) -> FieldRule {
        // label, then any mix of half/full-width colons and whitespace
        let pattern = format!(r"{}[:：\s]*({value})", regex::escape(label));
        FieldRule {
            field,
            pattern: Regex::new(&pattern).unwrap(),
            default,
        }
    }
}

// Value classes are ASCII only: full-width digits do not count as a number and
// a cup size stops at the first non-ASCII character ("Eカップ" reads as "E").
pub fn default_rules() -> Vec<FieldRule> {
    vec![
        FieldRule::labelled(Field::Name, "名前", r"\S+", None),
        FieldRule::labelled(Field::Age, "年齢", r"[0-9]+", Some(UNKNOWN)),
        FieldRule::labelled(Field::Height, "身長", r"[0-9]+", Some(UNKNOWN)),
        FieldRule::labelled(Field::Bust, "バスト", r"[0-9A-Za-z_]+", Some(UNKNOWN)),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub link: String,
    pub name: String,
    pub age: String,
    pub height: String,
    pub bust: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Miss {
    NoLink,
    MissingField(Field),
}

#[derive(Debug, Clone)]
pub struct Extractor {
    link: Regex,
    rules: Vec<FieldRule>,
}

impl Extractor {
    /// Builds the extractor for movie links on `origin` (e.g.
    /// `https://delice.love`) with the default field rules.
    pub fn new(origin: &str) -> anyhow::Result<Extractor> {
        let link = format!(
            r"{}/movie/[0-9]+\?openExternalBrowser=1",
            regex::escape(origin.trim_end_matches('/'))
        );
        Ok(Extractor {
            link: Regex::new(&link).with_context(|| format!("bad provider origin {origin:?}"))?,
            rules: default_rules(),
        })
    }

    pub fn with_rules(mut self, rules: Vec<FieldRule>) -> Extractor {
        self.rules = rules;
        self
    }

    pub fn extract(&self, detail: &str) -> Result<Extracted, Miss> {
        let link = self.link.find(detail).ok_or(Miss::NoLink)?.as_str().to_string();
        let mut out = Extracted {
            link,
            name: String::new(),
            age: String::new(),
            height: String::new(),
            bust: String::new(),
        };
        for rule in &self.rules {
            let value = match rule.pattern.captures(detail) {
                Some(caps) => caps[1].to_string(),
                None => match rule.default {
                    Some(default) => default.to_string(),
                    None => return Err(Miss::MissingField(rule.field)),
                },
            };
            match rule.field {
                Field::Name => out.name = value,
                Field::Age => out.age = value,
                Field::Height => out.height = value,
                Field::Bust => out.bust = value,
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub found: usize,
    pub skipped: usize,
    pub added: usize,
    pub evicted: usize,
    pub total: usize,
}

/// Extracts, deduplicates, appends and caps. Does not persist.
pub fn ingest(
    items: &mut Vec<NotificationItem>,
    records: &[RawNotification],
    extractor: &Extractor,
    cap: usize,
    now: DateTime<Utc>,
) -> IngestReport {
    let mut skipped = 0;
    let mut candidates = Vec::with_capacity(records.len());
    for record in records {
        match extractor.extract(&record.detail) {
            Ok(e) => candidates.push(NewItem {
                link: e.link,
                name: e.name,
                age: e.age,
                height: e.height,
                bust: e.bust,
                notification_date: record.send_date.clone(),
            }),
            Err(miss) => {
                tracing::debug!("skipping notification ({miss:?})");
                skipped += 1;
            }
        }
    }

    let added = item_store::append_new(items, candidates, now);
    let evicted = item_store::enforce_cap(items, cap);
    IngestReport {
        found: records.len(),
        skipped,
        added,
        evicted,
        total: items.len(),
    }
}

/// Runs the whole pipeline over an already fetched page and persists the
/// result.
pub fn ingest_page(
    store: &item_store::ItemStore,
    html: &str,
    extractor: &Extractor,
    cap: usize,
) -> anyhow::Result<IngestReport> {
    let payload = extract_next_data(html)?;
    let records = locate_notifications(&payload);
    tracing::info!(
        "found {} {} in raw data",
        records.len(),
        pluralize("notification", records.len())
    );

    let mut items = store.load()?;
    let report = ingest(&mut items, &records, extractor, cap, Utc::now());
    store.save(&items)?;
    tracing::info!(
        "collection complete: added {} new {}, total {}",
        report.added,
        pluralize("item", report.added),
        report.total
    );
    Ok(report)
}
