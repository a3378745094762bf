//! The gate every backend request passes through.
//!
//! Outbound, it reads the token from durable storage and attaches it as a
//! bearer credential. Inbound, failed responses are classified and may
//! invalidate the persisted session before the original error is returned
//! to the caller unchanged.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::{TOKEN_KEY, USER_KEY};
use crate::storage::KeyValueStore;

use super::{ApiError, Navigator, LOGIN_PATH};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds. No other timeout is enforced.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 404 messages meaning the signed-in account no longer exists
const ACCOUNT_MISSING_PHRASES: [&str; 2] = ["用户不存在", "账户不存在"];

/// Shown when a 401 arrives for an authenticated request
const SESSION_EXPIRED_NOTICE: &str = "登录已过期，请重新登录";

/// Shown when the backend reports the account as missing
const ACCOUNT_MISSING_NOTICE: &str = "用户信息已失效，请重新登录";

// ============================================================================
// Classification
// ============================================================================

/// Why the gate dropped the persisted session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// 401 on a request other than login
    SessionExpired,
    /// 404 whose message says the account is gone
    AccountMissing,
}

impl InvalidationReason {
    pub fn notice(&self) -> &'static str {
        match self {
            InvalidationReason::SessionExpired => SESSION_EXPIRED_NOTICE,
            InvalidationReason::AccountMissing => ACCOUNT_MISSING_NOTICE,
        }
    }
}

/// What the gate does with a failed response before handing it back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    PassThrough,
    /// Remove token and user; when `redirect` is set, also notify and send
    /// the host to the login view.
    Invalidate {
        reason: InvalidationReason,
        redirect: bool,
    },
}

/// Decide how to react to a failed response.
///
/// `request_path` is the path the call was made to, `message` the backend's
/// `error` field, `current_path` where the host currently is.
pub fn classify_failure(
    request_path: &str,
    status: u16,
    message: Option<&str>,
    current_path: &str,
) -> GateAction {
    let on_login_view = current_path == LOGIN_PATH;

    match status {
        // A failed login legitimately answers 401; only other calls mean expiry.
        // Already on the login view: nothing to clear or announce.
        401 if !request_path.contains(LOGIN_PATH) && !on_login_view => GateAction::Invalidate {
            reason: InvalidationReason::SessionExpired,
            redirect: true,
        },
        404 => {
            let account_missing = message
                .map(|m| ACCOUNT_MISSING_PHRASES.iter().any(|p| m.contains(p)))
                .unwrap_or(false);
            if account_missing {
                GateAction::Invalidate {
                    reason: InvalidationReason::AccountMissing,
                    redirect: !on_login_view,
                }
            } else {
                GateAction::PassThrough
            }
        }
        _ => GateAction::PassThrough,
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Called after the gate has cleared the persisted session
pub type InvalidationListener = Box<dyn Fn(InvalidationReason) + Send + Sync>;

/// HTTP gate to the backend API.
///
/// Holds no session state of its own: the token is read from storage on
/// every request, so a login or logout takes effect on the next call.
/// Owners of in-memory session state subscribe with `on_invalidated`.
pub struct Gate {
    client: Client,
    base_url: String,
    storage: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    listeners: RwLock<Vec<InvalidationListener>>,
}

impl Gate {
    /// Create a gate for `base_url` (e.g. `http://localhost:5000/api`)
    pub fn new(
        base_url: impl Into<String>,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
            navigator,
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Register `listener` to run whenever the gate drops the session.
    ///
    /// Listeners run synchronously on the task that received the failing
    /// response, before the error is returned to the caller.
    pub fn on_invalidated<F>(&self, listener: F)
    where
        F: Fn(InvalidationReason) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    fn emit_invalidated(&self, reason: InvalidationReason) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(reason);
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Headers attached to every request; includes the bearer token when one
    /// is stored.
    fn outbound_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let token = match self.storage.get(TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read token from storage");
                None
            }
        };

        if let Some(token) = token {
            match header::HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "Stored token is not a valid header value"),
            }
        }
        headers
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.client.get(self.url(path));
        self.dispatch(path, request).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.client.post(self.url(path)).json(body);
        self.dispatch(path, request).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        debug!(path, "Dispatching request");
        let response = request.headers(self.outbound_headers()).send().await?;

        let status = response.status();

        if !status.is_success() {
            // An unreadable body must not skip classification
            let body = response.text().await.unwrap_or_else(|e| {
                warn!(path, error = %e, "Failed to read error body");
                String::new()
            });
            let err = ApiError::from_status(status, &body);
            self.intercept_failure(path, &err);
            return Err(err);
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e))
        })
    }

    /// Run the side effects for a failed response. Never swallows the error.
    fn intercept_failure(&self, path: &str, err: &ApiError) {
        let Some(status) = err.status() else {
            return;
        };

        let current_path = self.navigator.current_path();
        match classify_failure(path, status, err.server_message(), &current_path) {
            GateAction::PassThrough => {}
            GateAction::Invalidate { reason, redirect } => {
                warn!(path, status, ?reason, redirect, "Session invalidated by backend");
                if redirect {
                    self.navigator.notify_error(reason.notice());
                }
                self.clear_session();
                self.emit_invalidated(reason);
                if redirect {
                    self.navigator.redirect(LOGIN_PATH);
                }
            }
        }
    }

    fn clear_session(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to clear session key");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
