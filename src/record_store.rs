//! Client for the remote record store: a spreadsheet-backed CRUD web app
//! holding small singleton records (session blobs, access tokens).
//!
//! The web app is loose about response shapes. A table read can come back as
//! a bare array, as `{"status": "success", "data": [...]}` or as
//! `{"status": "error", "message": ...}`, and a record's fields may be nested
//! under `data`. [`TableData::from_value`] folds all of these into one schema
//! so callers never inspect raw JSON.

use anyhow::Context as _;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use serde_json::{Map, Value, json};

use crate::config::{ConfigurationError, required_secret};
use secrecy::ExposeSecret;

#[derive(Clone)]
pub struct RecordStoreClient {
    client: Client,
    endpoint: String,
}

/// A table read, normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    /// Set when the store reported `status: "error"` (usually: no such table).
    pub error: Option<String>,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: Option<String>,
    pub fields: Map<String, Value>,
}

impl TableData {
    pub fn from_value(v: Value) -> TableData {
        match v {
            Value::Array(rows) => TableData {
                error: None,
                records: rows.into_iter().filter_map(Record::from_value).collect(),
            },
            Value::Object(mut obj) => {
                let error = match obj.get("status").and_then(Value::as_str) {
                    Some("error") => Some(
                        obj.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unspecified error")
                            .to_string(),
                    ),
                    _ => None,
                };
                let records = match obj.remove("data") {
                    Some(Value::Array(rows)) => {
                        rows.into_iter().filter_map(Record::from_value).collect()
                    }
                    // a lookup by id may answer with the single record
                    Some(row @ Value::Object(_)) => Record::from_value(row).into_iter().collect(),
                    _ => Vec::new(),
                };
                TableData { error, records }
            }
            _ => TableData::default(),
        }
    }

    pub fn is_missing_or_empty(&self) -> bool {
        self.error.is_some() || self.records.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id.as_deref() == Some(id))
    }
}

impl Record {
    fn from_value(v: Value) -> Option<Record> {
        let Value::Object(mut obj) = v else {
            return None;
        };
        let id = obj.remove("id").and_then(|id| match id {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        // fields nested under `data` take part in lookups like top-level ones
        if let Some(Value::Object(nested)) = obj.remove("data") {
            for (k, v) in nested {
                obj.entry(k).or_insert(v);
            }
        }
        Some(Record { id, fields: obj })
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl RecordStoreClient {
    pub fn new_from_env() -> Result<Self, ConfigurationError> {
        let endpoint = required_secret("GAS_DB_API_URL")?;
        Ok(Self::new(endpoint.expose_secret().to_string()))
    }

    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    /// Reads a table, or one record of it. Any failure is logged and reported
    /// as `None`.
    pub async fn get_table_data(&self, table: &str, id: Option<&str>) -> Option<TableData> {
        match self.try_get_table_data(table, id).await {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::error!("record store read of `{table}` failed: {e:?}");
                None
            }
        }
    }

    async fn try_get_table_data(&self, table: &str, id: Option<&str>) -> anyhow::Result<TableData> {
        let mut params = vec![("table", table)];
        if let Some(id) = id {
            params.push(("id", id));
        }
        let url = Url::parse_with_params(&self.endpoint, &params)
            .context("record store endpoint is not a valid URL")?;
        let resp = self.client.get(url).send().await?;
        let body = deserialize_response(resp).await?;
        Ok(TableData::from_value(body))
    }

    /// Looks up a singleton record by its well-known id.
    pub async fn find_record(&self, table: &str, id: &str) -> Option<Record> {
        let data = self.get_table_data(table, None).await?;
        data.find(id).cloned()
    }

    pub async fn create_table(&self, table: &str, columns: &[&str]) -> anyhow::Result<Value> {
        self.post(json!({
            "action": "create_table",
            "tableName": table,
            "headers": columns,
        }))
        .await
        .with_context(|| format!("record store create_table `{table}`"))
    }

    pub async fn create_record(&self, table: &str, data: Value) -> anyhow::Result<Value> {
        self.post(json!({
            "action": "create",
            "table": table,
            "data": data,
        }))
        .await
        .with_context(|| format!("record store create in `{table}`"))
    }

    pub async fn update_record(&self, table: &str, id: &str, data: Value) -> anyhow::Result<Value> {
        self.post(json!({
            "action": "update",
            "table": table,
            "id": id,
            "data": data,
        }))
        .await
        .with_context(|| format!("record store update of `{id}` in `{table}`"))
    }

    /// Updates the record `id` in place, or creates it with that id.
    pub async fn upsert_record(&self, table: &str, id: &str, mut data: Map<String, Value>) -> anyhow::Result<()> {
        let exists = self
            .get_table_data(table, None)
            .await
            .is_some_and(|t| t.find(id).is_some());
        if exists {
            tracing::info!("updating existing record `{id}` in `{table}`");
            self.update_record(table, id, Value::Object(data)).await?;
        } else {
            tracing::info!("creating record `{id}` in `{table}`");
            data.insert("id".to_string(), Value::String(id.to_string()));
            self.create_record(table, Value::Object(data)).await?;
        }
        Ok(())
    }

    // The web app only accepts `text/plain` bodies; the JSON goes in as text.
    async fn post(&self, body: Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain")
            .body(body.to_string())
            .send()
            .await?;
        let body = deserialize_response(resp).await?;
        if body.get("status").and_then(Value::as_str) == Some("error") {
            anyhow::bail!(
                "record store rejected the write: {}",
                body.get("message").and_then(Value::as_str).unwrap_or("no message")
            );
        }
        Ok(body)
    }
}

async fn deserialize_response(response: Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .context("failed to read record store response")?;
    if !status.is_success() {
        anyhow::bail!("record store returned {status}: {body}");
    }
    crate::deserialize_payload::<Value>(&body).context("record store response is not JSON")
}
