//! End-to-end inbox tests against a mock mailbox service.

#![allow(clippy::unwrap_used)]

use mockito::Matcher;
use msgcenter_api::{Credentials, MessageId};
use msgcenter_core::{Inbox, InboxConfig, SyncError, SyncPhase, open_in_memory};
use serde_json::json;

const LIST_PATH: &str = "/api/user/user-1/messages/";
const MARK_READ_PATH: &str = "/api/user/user-1/messages/mark-read/";

async fn inbox(server: &mockito::ServerGuard) -> Inbox {
    let config = InboxConfig::new(&server.url()).unwrap();
    let inbox = Inbox::new(config, open_in_memory().await.unwrap())
        .await
        .unwrap();
    inbox
        .identity()
        .set_credentials(Credentials::new("user-1", "secret", "channel-1"))
        .await
        .unwrap();
    inbox
}

fn listing_body() -> String {
    json!({
        "messages": [
            {"id": "m1", "createdAt": "2026-01-24T10:00:00Z", "bodyRef": "https://x/m1"},
            {"id": "m2", "createdAt": "2026-01-25T10:00:00Z", "bodyRef": "https://x/m2",
             "title": "Welcome"}
        ],
        "nextToken": "tok-1",
        "full": true
    })
    .to_string()
}

#[tokio::test]
async fn test_sync_and_mark_read_over_http() {
    let mut server = mockito::Server::new_async().await;
    let list = server
        .mock("GET", LIST_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(listing_body())
        .create_async()
        .await;
    let mark_read = server
        .mock("POST", MARK_READ_PATH)
        .match_header("x-channel-id", "channel-1")
        .match_body(Matcher::Json(json!({"ids": ["m1"]})))
        .with_status(200)
        .with_body(r#"{"acknowledged": ["m1"]}"#)
        .create_async()
        .await;

    let inbox = inbox(&server).await;
    let snapshot = inbox.refresh().await.unwrap();
    list.assert_async().await;

    let ids: Vec<&str> = snapshot.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m2", "m1"]);
    assert_eq!(inbox.metadata().await.unwrap().last_sync_token.as_deref(), Some("tok-1"));

    assert!(inbox.mark_read(&MessageId::from("m1")).await.unwrap());
    inbox.flush_pending().await;
    mark_read.assert_async().await;

    let m1 = inbox.message(&MessageId::from("m1")).await.unwrap().unwrap();
    assert!(m1.is_read);
    assert!(!m1.dirty);
    assert_eq!(inbox.unread_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unauthorized_keeps_last_good_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let list = server
        .mock("GET", LIST_PATH)
        .with_status(200)
        .with_body(listing_body())
        .create_async()
        .await;

    let inbox = inbox(&server).await;
    inbox.refresh().await.unwrap();
    list.remove_async().await;

    server
        .mock("GET", LIST_PATH)
        .match_query(Matcher::UrlEncoded("since".into(), "tok-1".into()))
        .with_status(401)
        .create_async()
        .await;

    let error = inbox.refresh().await.unwrap_err();
    assert!(matches!(error, SyncError::Unauthorized(_)));
    assert_eq!(inbox.phase(), SyncPhase::Failed);
    assert_eq!(inbox.identity().refresh_request_count(), 1);
    assert_eq!(inbox.messages().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rejected_delete_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", LIST_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(listing_body())
        .create_async()
        .await;
    let delete = server
        .mock("POST", "/api/user/user-1/messages/delete/")
        .with_status(404)
        .with_body("no such message")
        .expect(1)
        .create_async()
        .await;

    let inbox = inbox(&server).await;
    inbox.refresh().await.unwrap();

    assert!(inbox.delete(&MessageId::from("m2")).await.unwrap());
    inbox.flush_pending().await;

    // Dropped from the retry set, so the next sync does not re-issue it and
    // the server's view brings the message back.
    let snapshot = inbox.refresh().await.unwrap();
    delete.assert_async().await;
    assert_eq!(snapshot.len(), 2);
}
