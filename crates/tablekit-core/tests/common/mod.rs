//! Shared setup for integration tests: a mock backend, in-memory storage
//! and a headless navigator wired into a gate and session store.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{json, Value};
use tablekit_core::{Gate, HeadlessNavigator, KeyValueStore, MemoryStore, SessionStore};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct Harness {
    pub server: MockServer,
    pub storage: Arc<MemoryStore>,
    pub navigator: Arc<HeadlessNavigator>,
    pub gate: Arc<Gate>,
    pub store: SessionStore,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_at("/files").await
    }

    /// Start with the navigator at `current_path`
    pub async fn start_at(current_path: &str) -> Self {
        let storage = Arc::new(MemoryStore::new());
        Self::start_with(current_path, storage.clone(), storage).await
    }

    /// Start with `backend` as the gate's storage; `storage` is the memory
    /// store behind it, kept for assertions
    pub async fn start_with(
        current_path: &str,
        storage: Arc<MemoryStore>,
        backend: Arc<dyn KeyValueStore>,
    ) -> Self {
        let server = MockServer::start().await;
        let navigator = Arc::new(HeadlessNavigator::new(current_path));
        let gate = Arc::new(
            Gate::new(
                format!("{}/api", server.uri()),
                backend,
                navigator.clone(),
            )
            .expect("gate"),
        );
        let store = SessionStore::new(gate.clone());
        Self {
            server,
            storage,
            navigator,
            gate,
            store,
        }
    }

    /// Answer `POST /api/login` for `username` with a successful login
    pub async fn accept_login(&self, username: &str, id: i64, token: Option<&str>) {
        let mut body = json!({
            "success": true,
            "user": { "id": id, "username": username },
            "message": "登录成功",
        });
        if let Some(token) = token {
            body["token"] = Value::from(token);
        }
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_partial_json(json!({ "username": username })))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer `GET /api{route}` with `status` and `body`
    pub async fn respond_get(&self, route: &str, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api{}", route)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

/// Storage that refuses to write one key, backed by a `MemoryStore`
pub struct RejectingStore {
    pub inner: Arc<MemoryStore>,
    pub rejected_key: &'static str,
}

impl KeyValueStore for RejectingStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if key == self.rejected_key {
            bail!("disk full");
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}
