//! `TokenProvider` tests against a fake record store and refresh endpoint.

use crate::common::{FakeSheet, Method, Response, TestBuilder};
use chrono::{DateTime, TimeDelta, Utc};
use notifeed::record_store::RecordStoreClient;
use notifeed::token::{ThreadsTokenRefresher, TokenProvider};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

fn now() -> DateTime<Utc> {
    "2025-03-20T12:00:00Z".parse().unwrap()
}

fn token_row(token: &str, age_days: i64) -> serde_json::Value {
    json!({
        "id": "threads_access_token",
        "access_token": token,
        "last_updated": (now() - TimeDelta::days(age_days)).to_rfc3339(),
    })
}

fn refresh_ok(builder: TestBuilder) -> TestBuilder {
    builder.handler(Method::GET, "refresh_access_token", |req| {
        assert_eq!(req.query_param("grant_type"), Some("th_refresh_token"));
        let old = req.query_param("access_token").unwrap();
        Response::json(json!({
            "access_token": format!("{old}-refreshed"),
            "token_type": "bearer",
            "expires_in": 5183944
        }))
    })
}

fn refresh_failing(builder: TestBuilder) -> TestBuilder {
    builder.handler(Method::GET, "refresh_access_token", |_req| {
        Response::json(json!({"error": {"message": "Session has expired"}})).code(400)
    })
}

async fn token(server_url: impl Fn(&str) -> String, initial: Option<&str>) -> anyhow::Result<Option<String>> {
    let store = RecordStoreClient::new(server_url("/exec"));
    let refresher = ThreadsTokenRefresher::new(server_url("/refresh_access_token"));
    let initial = initial.map(|t| SecretString::from(t.to_string()));
    let provider = TokenProvider::new(&store, refresher, initial);
    let token = provider.access_token(now()).await?;
    Ok(token.map(|t| t.expose_secret().to_string()))
}

#[tokio::test]
async fn fresh_token_is_used_as_is() {
    let sheet = FakeSheet::with_rows(vec![token_row("tok", 3)]);
    let server = refresh_ok(sheet.mount(TestBuilder::default())).start();

    let token = token(|p| server.url(p), None).await.unwrap();
    assert_eq!(token.as_deref(), Some("tok"));
    assert!(sheet.writes().is_empty());
    server
        .events
        .assert_eq(&[(Method::GET, "/exec"), (Method::GET, "/exec")]);
}

#[tokio::test]
async fn stale_token_is_refreshed_and_written_back() {
    let sheet = FakeSheet::with_rows(vec![token_row("tok", 11)]);
    let server = refresh_ok(sheet.mount(TestBuilder::default())).start();

    let token = token(|p| server.url(p), None).await.unwrap();
    assert_eq!(token.as_deref(), Some("tok-refreshed"));

    let rows = sheet.rows();
    assert_eq!(rows[0]["access_token"], "tok-refreshed");
    assert_eq!(rows[0]["last_updated"], now().to_rfc3339());
    server.events.assert_eq(&[
        (Method::GET, "/exec"),
        (Method::GET, "/exec"),
        (Method::GET, "/refresh_access_token"),
        (Method::POST, "/exec"),
    ]);
}

#[tokio::test]
async fn undated_token_is_refreshed() {
    let sheet = FakeSheet::with_rows(vec![json!({"id": "threads_access_token", "access_token": "tok"})]);
    let server = refresh_ok(sheet.mount(TestBuilder::default())).start();

    let token = token(|p| server.url(p), None).await.unwrap();
    assert_eq!(token.as_deref(), Some("tok-refreshed"));
}

#[tokio::test]
async fn failed_refresh_falls_back_to_old_token() {
    let sheet = FakeSheet::with_rows(vec![token_row("tok", 30)]);
    let server = refresh_failing(sheet.mount(TestBuilder::default())).start();

    let token = token(|p| server.url(p), None).await.unwrap();
    assert_eq!(token.as_deref(), Some("tok"));
    assert!(sheet.writes().is_empty());
    assert_eq!(sheet.rows()[0]["access_token"], "tok");
}

#[tokio::test]
async fn failed_write_back_is_an_error() {
    let server = refresh_ok(TestBuilder::default())
        .handler(Method::GET, "exec", |_req| {
            Response::json(json!([{
                "id": "threads_access_token",
                "access_token": "tok",
                "last_updated": "2020-01-01T00:00:00Z"
            }]))
        })
        .handler(Method::POST, "exec", |_req| {
            Response::json(json!({"status": "error", "message": "quota exceeded"}))
        })
        .start();

    let err = token(|p| server.url(p), None).await.unwrap_err();
    assert!(format!("{err:?}").contains("quota exceeded"), "{err:?}");
}

#[tokio::test]
async fn missing_table_is_bootstrapped_from_initial_token() {
    let sheet = FakeSheet::default();
    let server = refresh_ok(sheet.mount(TestBuilder::default())).start();

    let token = token(|p| server.url(p), Some("seed")).await.unwrap();
    // the seeded record is fresh, so no refresh happens
    assert_eq!(token.as_deref(), Some("seed"));

    let rows = sheet.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "threads_access_token");
    assert_eq!(rows[0]["access_token"], "seed");
    let actions: Vec<_> = sheet
        .writes()
        .iter()
        .map(|w| w["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, vec!["create_table", "create"]);
}

#[tokio::test]
async fn no_token_anywhere() {
    let sheet = FakeSheet::default();
    let server = refresh_ok(sheet.mount(TestBuilder::default())).start();

    let token = token(|p| server.url(p), None).await.unwrap();
    assert_eq!(token, None);
}
