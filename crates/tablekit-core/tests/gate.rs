//! Transport gate: credential attachment and session invalidation

mod common;

use std::sync::{Arc, Mutex};

use common::Harness;
use serde_json::{json, Value};
use tablekit_core::api::InvalidationReason;
use tablekit_core::auth::{TOKEN_KEY, USER_KEY};
use tablekit_core::{
    ApiError, Gate, HeadlessNavigator, KeyValueStore, MemoryStore, SessionStore, LOGIN_PATH,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn signed_in() -> Harness {
    let h = Harness::start().await;
    h.accept_login("alice", 1, Some("abc")).await;
    assert!(h.store.login("alice", "pw").await.is_success());
    h
}

fn assert_session_cleared(h: &Harness) {
    assert!(!h.storage.contains(TOKEN_KEY).unwrap());
    assert!(!h.storage.contains(USER_KEY).unwrap());
}

fn assert_session_kept(h: &Harness) {
    assert!(h.storage.contains(TOKEN_KEY).unwrap());
    assert!(h.storage.contains(USER_KEY).unwrap());
}

#[tokio::test]
async fn test_attaches_bearer_token() {
    let h = signed_in().await;
    Mock::given(method("GET"))
        .and(path("/api/users/1/files"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
        .expect(1)
        .mount(&h.server)
        .await;

    let body: Value = h.gate.get("/users/1/files").await.unwrap();
    assert_eq!(body["files"], json!([]));
}

#[tokio::test]
async fn test_no_token_no_authorization_header() {
    let h = Harness::start().await;
    h.respond_get("/files/3", 200, json!({"id": 3})).await;

    let _: Value = h.gate.get("/files/3").await.unwrap();

    let requests = h.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_401_expires_session_and_redirects_once() {
    let h = signed_in().await;
    h.respond_get("/users/1/files", 401, json!({"error": "token expired"}))
        .await;

    let err = h.gate.get::<Value>("/users/1/files").await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_session_cleared(&h);
    assert_eq!(h.navigator.redirects(), vec![LOGIN_PATH.to_string()]);
    assert_eq!(h.navigator.notifications(), vec!["登录已过期，请重新登录".to_string()]);
}

#[tokio::test]
async fn test_401_on_login_view_is_left_alone() {
    let h = signed_in().await;
    h.navigator.visit(LOGIN_PATH);
    h.respond_get("/users/1/files", 401, json!({})).await;

    assert!(h.gate.get::<Value>("/users/1/files").await.is_err());

    assert_session_kept(&h);
    assert!(h.navigator.redirects().is_empty());
    assert!(h.navigator.notifications().is_empty());
}

#[tokio::test]
async fn test_404_account_missing_clears_session() {
    for message in ["用户不存在", "账户不存在"] {
        let h = signed_in().await;
        h.respond_get("/users/1/files", 404, json!({"success": false, "error": message}))
            .await;

        let err = h.gate.get::<Value>("/users/1/files").await.unwrap_err();

        assert_eq!(err.server_message(), Some(message));
        assert_session_cleared(&h);
        assert_eq!(h.navigator.redirects(), vec![LOGIN_PATH.to_string()]);
        assert_eq!(
            h.navigator.notifications(),
            vec!["用户信息已失效，请重新登录".to_string()]
        );
    }
}

#[tokio::test]
async fn test_404_account_missing_on_login_view_clears_quietly() {
    let h = signed_in().await;
    h.navigator.visit(LOGIN_PATH);
    h.respond_get("/users/1/files", 404, json!({"error": "用户不存在"}))
        .await;

    assert!(h.gate.get::<Value>("/users/1/files").await.is_err());

    assert_session_cleared(&h);
    assert!(h.navigator.redirects().is_empty());
    assert!(h.navigator.notifications().is_empty());
}

#[tokio::test]
async fn test_404_unrelated_message_passes_through() {
    let h = signed_in().await;
    h.respond_get("/files/3/download-excel", 404, json!({"error": "Excel文件不存在"}))
        .await;

    let err = h.gate.get::<Value>("/files/3/download-excel").await.unwrap_err();

    assert!(matches!(err, ApiError::NotFound { .. }));
    assert_eq!(err.server_message(), Some("Excel文件不存在"));
    assert_session_kept(&h);
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_server_error_passes_through() {
    let h = signed_in().await;
    h.respond_get("/files/3", 500, json!({"error": "用户不存在"})).await;

    let err = h.gate.get::<Value>("/files/3").await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_session_kept(&h);
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_invalid_json_is_reported() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&h.server)
        .await;

    let err = h.gate.get::<Value>("/files/3").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_expiry_drops_in_memory_session() {
    let h = signed_in().await;
    h.store.cache().unwrap().save_manual_text_input("draft").unwrap();
    h.respond_get("/users/1/files", 401, json!({})).await;

    assert!(h.gate.get::<Value>("/users/1/files").await.is_err());

    assert!(!h.store.is_logged_in());
    assert_eq!(h.store.token(), None);
    assert!(h.store.cache().is_none());
}

#[tokio::test]
async fn test_account_missing_drops_in_memory_session() {
    let h = signed_in().await;
    h.navigator.visit(LOGIN_PATH);
    h.respond_get("/users/1/files", 404, json!({"error": "账户不存在"}))
        .await;

    assert!(h.gate.get::<Value>("/users/1/files").await.is_err());

    assert!(!h.store.is_logged_in());
}

#[tokio::test]
async fn test_passed_through_failure_keeps_in_memory_session() {
    let h = signed_in().await;
    h.respond_get("/files/3", 404, json!({"error": "文件不存在"})).await;

    assert!(h.gate.get::<Value>("/files/3").await.is_err());

    assert!(h.store.is_logged_in());
}

#[tokio::test]
async fn test_listeners_hear_the_reason() {
    let h = signed_in().await;
    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = heard.clone();
    h.gate
        .on_invalidated(move |reason| sink.lock().unwrap().push(reason));
    h.respond_get("/users/1/files", 401, json!({})).await;

    assert!(h.gate.get::<Value>("/users/1/files").await.is_err());

    assert_eq!(
        *heard.lock().unwrap(),
        vec![InvalidationReason::SessionExpired]
    );
}

#[tokio::test]
async fn test_truncated_401_body_still_expires_session() {
    // Promise a body longer than what is sent, then hang up
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(
                b"HTTP/1.1 401 Unauthorized\r\nContent-Type: application/json\r\nContent-Length: 64\r\n\r\n{\"err",
            )
            .await
            .unwrap();
    });

    let storage = Arc::new(MemoryStore::new());
    storage.set(TOKEN_KEY, "abc").unwrap();
    storage.set(USER_KEY, r#"{"id":1,"username":"alice"}"#).unwrap();
    let navigator = Arc::new(HeadlessNavigator::new("/files"));
    let gate = Arc::new(
        Gate::new(
            format!("http://{}/api", addr),
            storage.clone(),
            navigator.clone(),
        )
        .unwrap(),
    );
    let store = SessionStore::new(gate.clone());
    assert!(store.is_logged_in());

    let err = gate.get::<Value>("/users/1/files").await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert!(storage.keys().is_empty());
    assert!(!store.is_logged_in());
    assert_eq!(navigator.redirects(), vec![LOGIN_PATH.to_string()]);
}
