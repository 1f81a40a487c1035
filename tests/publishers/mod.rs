//! Publisher tests: the Threads two-step publish and the X tweet call.

use crate::common::{Method, Response, TestBuilder};
use notifeed::queue::{PostQueue, QueueOutcome};
use notifeed::social::{PublishOutcome, Publisher, ThreadsClient, TwitterClient, TwitterCredentials};
use serde_json::json;

fn creds() -> TwitterCredentials {
    TwitterCredentials {
        api_key: "key".to_string().into(),
        api_secret: "secret".to_string().into(),
        access_token: "token".to_string().into(),
        access_secret: "token-secret".to_string().into(),
    }
}

#[tokio::test]
async fn threads_creates_then_publishes() {
    let server = TestBuilder::default()
        .handler(Method::POST, "me/threads", |req| {
            assert_eq!(req.query_param("media_type"), Some("TEXT"));
            assert_eq!(req.query_param("text"), Some("名前：Taro\nhttps://x/?a=1&b=2"));
            assert_eq!(req.query_param("access_token"), Some("th-token"));
            Response::json(json!({"id": "container-1"}))
        })
        .handler(Method::POST, "me/threads_publish", |req| {
            assert_eq!(req.query_param("creation_id"), Some("container-1"));
            assert_eq!(req.query_param("access_token"), Some("th-token"));
            Response::json(json!({"id": "post-9"}))
        })
        .start();

    let client = ThreadsClient::new(server.url(""), "th-token".to_string().into());
    let outcome = client
        .publish("名前：Taro\nhttps://x/?a=1&b=2")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PublishOutcome::Published {
            post_id: "post-9".into()
        }
    );
    server.events.assert_eq(&[
        (Method::POST, "/me/threads"),
        (Method::POST, "/me/threads_publish"),
    ]);
}

#[tokio::test]
async fn threads_stops_when_container_fails() {
    let server = TestBuilder::default()
        .handler(Method::POST, "me/threads", |_req| {
            Response::json(json!({"error": {"message": "Invalid OAuth access token"}})).code(400)
        })
        .start();

    let client = ThreadsClient::new(server.url(""), "bad".to_string().into());
    let err = client.publish("hi").await.unwrap_err();
    assert!(format!("{err:?}").contains("Invalid OAuth access token"), "{err:?}");
    server.events.assert_eq(&[(Method::POST, "/me/threads")]);
}

#[tokio::test]
async fn tweet_is_signed() {
    let server = TestBuilder::default()
        .handler(Method::POST, "2/tweets", |req| {
            let auth = req.headers.get("authorization").unwrap();
            assert!(auth.starts_with("OAuth "), "{auth}");
            assert!(auth.contains("oauth_consumer_key=\"key\""), "{auth}");
            assert!(auth.contains("oauth_token=\"token\""), "{auth}");
            assert!(auth.contains("oauth_signature_method=\"HMAC-SHA1\""), "{auth}");
            assert!(auth.contains("oauth_signature=\""), "{auth}");
            assert_eq!(req.json(), json!({"text": "hello"}));
            Response::json(json!({"data": {"id": "1800000000000000000", "text": "hello"}})).code(201)
        })
        .start();

    let client = TwitterClient::new(creds(), server.url(""));
    assert_eq!(client.tweet("hello").await.unwrap(), "1800000000000000000");
}

#[tokio::test]
async fn rejected_tweet_is_an_error() {
    let server = TestBuilder::default()
        .handler(Method::POST, "2/tweets", |_req| {
            Response::json(json!({"title": "Forbidden", "detail": "duplicate content"})).code(403)
        })
        .start();

    let client = TwitterClient::new(creds(), server.url(""));
    let err = client.publish("hello").await.unwrap_err();
    assert!(format!("{err:?}").contains("duplicate content"), "{err:?}");
}

#[tokio::test]
async fn queue_advances_only_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let queue = PostQueue {
        entries_path: dir.path().join("tweets.txt"),
        status_path: dir.path().join("tweets_status.json"),
    };
    std::fs::write(&queue.entries_path, "first\n\nsecond\nthird\n").unwrap();
    std::fs::write(&queue.status_path, r#"{"lastIndex": 1}"#).unwrap();

    let server = TestBuilder::default()
        .handler(Method::POST, "2/tweets", |req| {
            if req.json()["text"] == "third" {
                Response::json(json!({"data": {"id": "42"}})).code(201)
            } else {
                Response::new().code(429).body(b"Too Many Requests")
            }
        })
        .start();
    let client = TwitterClient::new(creds(), server.url(""));

    let outcome = queue.post_next(&client).await.unwrap();
    assert_eq!(
        outcome,
        QueueOutcome::Published {
            index: 2,
            post_id: "42".into()
        }
    );
    assert_eq!(queue.load_status().last_index, 2);

    // wraps to "first", which the server rejects
    let outcome = queue.post_next(&client).await.unwrap();
    assert_eq!(outcome, QueueOutcome::Failed { index: 0 });
    assert_eq!(queue.load_status().last_index, 2);
}
