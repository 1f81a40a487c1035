//! Fetching the notification page with a replayed browser session and
//! ingesting it.

use crate::common::{FakeSheet, Method, Response, TestBuilder};
use notifeed::ingest::{Extractor, ingest_page};
use notifeed::item_store::{ItemStore, Platform};
use notifeed::record_store::RecordStoreClient;
use notifeed::session::{self, PageFetcher, StorageState};
use serde_json::json;
use url::Url;

const STATE: &str = r#"{
    "cookies": [
        {"name": "sid", "value": "abc", "domain": "127.0.0.1", "path": "/", "expires": -1,
         "httpOnly": true, "secure": false, "sameSite": "Lax"},
        {"name": "elsewhere", "value": "x", "domain": "example.com", "path": "/"}
    ],
    "origins": []
}"#;

fn page() -> String {
    let detail = |n: u32, name: &str| {
        format!(
            "新着動画のお知らせ\n名前：{name}\n年齢：2{n}\n身長：16{n}\nバスト：D\n\n\
             https://delice.love/movie/{n}?openExternalBrowser=1"
        )
    };
    let data = json!({
        "props": {"pageProps": {"dehydratedState": {"queries": [
            {"state": {"data": {"user": {"id": 1}}}},
            {"state": {"data": {"pages": [{"data": [
                {"title": "新着", "detail": detail(1, "Hana"), "send_date": "2025-05-01 10:00"},
                {"title": "新着", "detail": detail(2, "Yui"), "send_date": "2025-05-02 10:00"},
                {"title": "お知らせ", "detail": "メンテナンスのお知らせ"}
            ]}]}}}
        ]}}}
    });
    format!(
        "<!DOCTYPE html><html><head></head><body><div id=\"__next\"></div>\
         <script id=\"__NEXT_DATA__\" type=\"application/json\">{data}</script></body></html>"
    )
}

fn serve_page(builder: TestBuilder) -> TestBuilder {
    builder.handler(Method::GET, "mypage/notification", |req| {
        if req.headers.get("cookie").map(String::as_str) != Some("sid=abc") {
            return Response::new()
                .header("Content-Type: text/html")
                .body(b"<html><body>login</body></html>");
        }
        Response::new()
            .header("Content-Type: text/html; charset=utf-8")
            .body(page().as_bytes())
    })
}

#[tokio::test]
async fn fetch_and_ingest() {
    let server = serve_page(TestBuilder::default()).start();
    let dir = tempfile::tempdir().unwrap();
    let store = ItemStore::new(dir.path().join("items.json"));
    let extractor = Extractor::new("https://delice.love").unwrap();

    let session = StorageState::parse(STATE).unwrap();
    let url = Url::parse(&server.url("/mypage/notification?openedNotificationIds=%2C1")).unwrap();
    let html = PageFetcher::new().fetch(&url, &session).await.unwrap();

    let report = ingest_page(&store, &html, &extractor, 500).unwrap();
    assert_eq!(report.found, 3);
    assert_eq!(report.added, 2);
    assert_eq!(report.skipped, 1);

    let items = store.load().unwrap();
    assert_eq!(items[0].name, "Hana");
    assert_eq!(items[0].age, "21");
    assert_eq!(items[1].link, "https://delice.love/movie/2?openExternalBrowser=1");
    assert_eq!(items[1].notification_date.as_deref(), Some("2025-05-02 10:00"));
    assert!(items.iter().all(|i| i.is_pending(Platform::Twitter)));

    // the same page again adds nothing
    let report = ingest_page(&store, &html, &extractor, 500).unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(store.load().unwrap(), items);
}

#[tokio::test]
async fn logged_out_page_is_fatal() {
    let server = serve_page(TestBuilder::default()).start();
    let dir = tempfile::tempdir().unwrap();
    let store = ItemStore::new(dir.path().join("items.json"));
    let extractor = Extractor::new("https://delice.love").unwrap();

    let url = Url::parse(&server.url("/mypage/notification")).unwrap();
    let html = PageFetcher::new()
        .fetch(&url, &StorageState::default())
        .await
        .unwrap();
    assert!(ingest_page(&store, &html, &extractor, 500).is_err());
    assert!(!store.path().exists());
}

#[tokio::test]
async fn session_from_remote_record() {
    let sheet = FakeSheet::with_rows(vec![json!({
        "id": "delice_website_session",
        "access_token": STATE,
        "last_updated": "2025-05-01T00:00:00Z"
    })]);
    let server = sheet.mount(TestBuilder::default()).start();
    let remote = RecordStoreClient::new(server.url("/exec"));
    let dir = tempfile::tempdir().unwrap();

    let state = session::resolve(None, &dir.path().join("auth.json"), Some(&remote))
        .await
        .unwrap();
    assert_eq!(state.cookies[0].name, "sid");

    // a local file wins over the remote record
    let local = dir.path().join("auth.json");
    std::fs::write(&local, r#"{"cookies": [], "origins": []}"#).unwrap();
    let state = session::resolve(None, &local, Some(&remote)).await.unwrap();
    assert!(state.cookies.is_empty());
}

#[tokio::test]
async fn no_session_anywhere() {
    let sheet = FakeSheet::with_rows(Vec::new());
    let server = sheet.mount(TestBuilder::default()).start();
    let remote = RecordStoreClient::new(server.url("/exec"));
    let dir = tempfile::tempdir().unwrap();

    let err = session::resolve(None, &dir.path().join("auth.json"), Some(&remote))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("auth session not found"), "{err}");
}
