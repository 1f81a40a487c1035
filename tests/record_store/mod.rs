//! `RecordStoreClient` tests.

use crate::common::{FakeSheet, Method, Response, TestBuilder};
use notifeed::record_store::RecordStoreClient;
use serde_json::{Map, json};

fn fields(pairs: &[(&str, &str)]) -> Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

#[tokio::test]
async fn reads_normalized_records() {
    let sheet = FakeSheet::with_rows(vec![
        json!({"id": "a", "access_token": "t1"}),
        json!({"id": "b", "data": {"access_token": "t2"}}),
    ]);
    let server = sheet.mount(TestBuilder::default()).start();
    let store = RecordStoreClient::new(server.url("/exec"));

    let data = store.get_table_data("threads_auth", None).await.unwrap();
    assert_eq!(data.error, None);
    assert_eq!(data.records.len(), 2);

    let b = store.find_record("threads_auth", "b").await.unwrap();
    assert_eq!(b.get_str("access_token"), Some("t2"));
    assert!(store.find_record("threads_auth", "c").await.is_none());

    let one = store.get_table_data("threads_auth", Some("a")).await.unwrap();
    assert_eq!(one.records.len(), 1);
    assert_eq!(one.records[0].get_str("access_token"), Some("t1"));

    server.events.assert_eq(&[
        (Method::GET, "/exec"),
        (Method::GET, "/exec"),
        (Method::GET, "/exec"),
        (Method::GET, "/exec"),
    ]);
}

#[tokio::test]
async fn missing_table_reads_as_error() {
    let sheet = FakeSheet::default();
    let server = sheet.mount(TestBuilder::default()).start();
    let store = RecordStoreClient::new(server.url("/exec"));

    let data = store.get_table_data("threads_auth", None).await.unwrap();
    assert_eq!(data.error.as_deref(), Some("Table not found"));
    assert!(data.is_missing_or_empty());
}

#[tokio::test]
async fn read_failures_degrade_to_none() {
    let server = TestBuilder::default()
        .handler(Method::GET, "exec", |_req| {
            Response::new().code(500).body(b"internal error")
        })
        .handler(Method::GET, "html", |_req| {
            Response::new().body(b"<html>login</html>")
        })
        .start();

    let store = RecordStoreClient::new(server.url("/exec"));
    assert!(store.get_table_data("t", None).await.is_none());
    let store = RecordStoreClient::new(server.url("/html"));
    assert!(store.get_table_data("t", None).await.is_none());
}

#[tokio::test]
async fn writes_send_actions() {
    let sheet = FakeSheet::default();
    let server = sheet.mount(TestBuilder::default()).start();
    let store = RecordStoreClient::new(server.url("/exec"));

    store
        .create_table("threads_auth", &["id", "access_token", "last_updated"])
        .await
        .unwrap();
    store
        .create_record("threads_auth", json!({"id": "x", "access_token": "t"}))
        .await
        .unwrap();
    store
        .update_record("threads_auth", "x", json!({"access_token": "u"}))
        .await
        .unwrap();

    let writes = sheet.writes();
    assert_eq!(
        writes[0],
        json!({
            "action": "create_table",
            "tableName": "threads_auth",
            "headers": ["id", "access_token", "last_updated"]
        })
    );
    assert_eq!(writes[1]["action"], "create");
    assert_eq!(writes[1]["table"], "threads_auth");
    assert_eq!(writes[2]["action"], "update");
    assert_eq!(writes[2]["id"], "x");
    assert_eq!(sheet.rows(), vec![json!({"id": "x", "access_token": "u"})]);
}

#[tokio::test]
async fn write_errors_propagate() {
    let sheet = FakeSheet::default();
    let server = sheet.mount(TestBuilder::default()).start();
    let store = RecordStoreClient::new(server.url("/exec"));

    // no table yet
    let err = store
        .create_record("threads_auth", json!({"id": "x"}))
        .await
        .unwrap_err();
    assert!(format!("{err:?}").contains("Table not found"), "{err:?}");

    let server = TestBuilder::default()
        .handler(Method::POST, "exec", |_req| Response::new().code(502))
        .start();
    let store = RecordStoreClient::new(server.url("/exec"));
    assert!(store.update_record("t", "x", json!({})).await.is_err());
}

#[tokio::test]
async fn upsert_creates_then_updates() {
    let sheet = FakeSheet::with_rows(Vec::new());
    let server = sheet.mount(TestBuilder::default()).start();
    let store = RecordStoreClient::new(server.url("/exec"));

    store
        .upsert_record("threads_auth", "delice_website_session", fields(&[("access_token", "v1")]))
        .await
        .unwrap();
    store
        .upsert_record("threads_auth", "delice_website_session", fields(&[("access_token", "v2")]))
        .await
        .unwrap();

    assert_eq!(
        sheet.rows(),
        vec![json!({"id": "delice_website_session", "access_token": "v2"})]
    );
    let actions: Vec<_> = sheet
        .writes()
        .iter()
        .map(|w| w["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, vec!["create", "update"]);
}
