//! The session store: owner of the signed-in identity.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::Gate;
use crate::cache::{self, ScopedCache};
use crate::storage::KeyValueStore;

use super::{Session, User, PLACEHOLDER_TOKEN, TOKEN_KEY, USER_KEY};

const LOGIN_ENDPOINT: &str = "/login";
const REGISTER_ENDPOINT: &str = "/register";

/// Returned by `login` when the backend gives no usable reason
pub const LOGIN_FAILED: &str = "登录失败";

/// Returned by `register` when the backend gives no usable reason
pub const REGISTER_FAILED: &str = "注册失败";

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    success: bool,
    user: Option<User>,
    token: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    success: bool,
    message: Option<String>,
    error: Option<String>,
}

/// Result of `login` and `register`. These never fail with an error; every
/// failure is folded into `Failure` with a message fit for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success { message: Option<String> },
    Failure { error: String },
}

impl AuthOutcome {
    fn failure(error: impl Into<String>) -> Self {
        AuthOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AuthOutcome::Failure { error } => Some(error),
            AuthOutcome::Success { .. } => None,
        }
    }
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOutcome::Success { message: Some(m) } => write!(f, "{}", m),
            AuthOutcome::Success { message: None } => write!(f, "ok"),
            AuthOutcome::Failure { error } => write!(f, "{}", error),
        }
    }
}

/// Owns the session: the in-memory identity plus its persisted copy.
///
/// Create one at startup and share it (`Arc<SessionStore>`) with whatever
/// issues backend calls. Construction restores the session from storage and
/// subscribes to the gate, so a session the backend rejects is dropped from
/// memory as soon as the gate clears it from storage.
pub struct SessionStore {
    gate: Arc<Gate>,
    storage: Arc<dyn KeyValueStore>,
    session: Arc<RwLock<Session>>,
}

impl SessionStore {
    /// Build a store over the gate's storage and restore any saved session
    pub fn new(gate: Arc<Gate>) -> Self {
        let storage = gate.storage().clone();
        let session = Arc::new(RwLock::new(Session::default()));

        let weak = Arc::downgrade(&session);
        gate.on_invalidated(move |reason| {
            if let Some(session) = weak.upgrade() {
                debug!(?reason, "Dropping invalidated session");
                *session.write().unwrap_or_else(PoisonError::into_inner) = Session::default();
            }
        });

        let store = Self {
            gate,
            storage,
            session,
        };
        store.load_from_storage();
        store
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user(&self) -> Option<User> {
        self.session().user
    }

    pub fn token(&self) -> Option<String> {
        self.session().token
    }

    pub fn is_logged_in(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_logged_in()
    }

    /// Cached UI artifacts of the signed-in user
    pub fn cache(&self) -> Option<ScopedCache> {
        self.session()
            .user_id()
            .map(|id| ScopedCache::for_user(self.storage.clone(), id))
    }

    /// Sign in and persist the new session.
    ///
    /// When a different user was signed in, their cached artifacts are purged
    /// once the new identity is stored. If storage rejects the session, the
    /// outcome is a failure and no half-written pair is left behind.
    ///
    /// Concurrent calls are not serialized: the session that ends up stored
    /// belongs to whichever response arrives last, not whichever call was
    /// made last.
    pub async fn login(&self, username: &str, password: &str) -> AuthOutcome {
        let credentials = Credentials { username, password };
        let response: LoginResponse = match self.gate.post(LOGIN_ENDPOINT, &credentials).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login request failed");
                return AuthOutcome::failure(e.server_message().unwrap_or(LOGIN_FAILED));
            }
        };

        if !response.success {
            debug!(error = ?response.error, "Login rejected");
            return AuthOutcome::failure(response.error.unwrap_or_else(|| LOGIN_FAILED.into()));
        }

        let Some(user) = response.user else {
            warn!("Login response is missing the user");
            return AuthOutcome::failure(LOGIN_FAILED);
        };

        let token = response
            .token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_TOKEN.to_string());

        if let Err(e) = self.commit(user, token) {
            warn!(error = %e, "Failed to persist session");
            return AuthOutcome::failure(LOGIN_FAILED);
        }
        AuthOutcome::Success {
            message: response.message,
        }
    }

    /// Persist and adopt a new session. Token and user are stored together or
    /// not at all.
    fn commit(&self, user: User, token: String) -> Result<()> {
        let serialized = serde_json::to_string(&user).context("Failed to serialize user")?;
        let mut session = self.write_session();

        // Storage is unchanged if this fails, so the old session still holds
        self.storage
            .set(TOKEN_KEY, &token)
            .context("Failed to persist token")?;

        if let Err(e) = self.storage.set(USER_KEY, &serialized) {
            // The stored token no longer matches any stored user
            self.remove_keys(&[TOKEN_KEY, USER_KEY]);
            *session = Session::default();
            return Err(e.context("Failed to persist user"));
        }

        if let Some(old_id) = session.user_id() {
            if old_id != user.id {
                info!(old_user = old_id, new_user = user.id, "Switching user, purging cache");
                cache::purge_user(self.storage.as_ref(), old_id);
            }
        }

        info!(user_id = user.id, username = %user.username, "Login successful");
        *session = Session::new(user, token);
        Ok(())
    }

    /// Create an account. Never touches the session.
    pub async fn register(&self, username: &str, password: &str) -> AuthOutcome {
        let credentials = Credentials { username, password };
        match self
            .gate
            .post::<RegisterResponse, _>(REGISTER_ENDPOINT, &credentials)
            .await
        {
            Ok(response) if response.success => AuthOutcome::Success {
                message: response.message,
            },
            Ok(response) => {
                AuthOutcome::failure(response.error.unwrap_or_else(|| REGISTER_FAILED.into()))
            }
            Err(e) => {
                warn!(error = %e, "Register request failed");
                AuthOutcome::failure(e.server_message().unwrap_or(REGISTER_FAILED))
            }
        }
    }

    /// Sign out: purge the user's cached artifacts and drop the session
    pub fn logout(&self) {
        let mut session = self.write_session();

        if let Some(user_id) = session.user_id() {
            cache::purge_user(self.storage.as_ref(), user_id);
        }
        cache::purge_legacy(self.storage.as_ref());

        *session = Session::default();
        self.remove_keys(&[TOKEN_KEY, USER_KEY]);
        info!("Logged out");
    }

    /// Restore the session from storage, repairing it if the token/user pair
    /// is incomplete or the stored user is unreadable.
    ///
    /// Leaves the in-memory session empty unless both keys are present and
    /// valid. Calling it twice with unchanged storage gives the same result.
    pub fn load_from_storage(&self) {
        let stored_user = self.read_key(USER_KEY);
        let stored_token = self.read_key(TOKEN_KEY);
        let mut session = self.write_session();

        *session = match (stored_user, stored_token) {
            (Some(raw_user), Some(token)) => match serde_json::from_str::<User>(&raw_user) {
                Ok(user) => {
                    debug!(user_id = user.id, "Restored session");
                    Session::new(user, token)
                }
                Err(e) => {
                    warn!(error = %e, "Stored user is unreadable, clearing session");
                    self.remove_keys(&[USER_KEY, TOKEN_KEY]);
                    Session::default()
                }
            },
            (Some(_), None) => {
                warn!("Stored user has no token, removing it");
                self.remove_keys(&[USER_KEY]);
                Session::default()
            }
            (None, Some(_)) => {
                warn!("Stored token has no user, removing it");
                self.remove_keys(&[TOKEN_KEY]);
                Session::default()
            }
            (None, None) => Session::default(),
        };
    }

    fn read_key(&self, key: &str) -> Option<String> {
        self.storage.get(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "Failed to read from storage");
            None
        })
    }

    fn remove_keys(&self, keys: &[&str]) {
        for key in keys {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove from storage");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
