//! Host hooks the gate uses to report an invalidated session.

use std::sync::Mutex;

use tracing::{info, warn};

/// Path of the login view; redirects always target it.
pub const LOGIN_PATH: &str = "/login";

/// What the gate needs from its host: where the user currently is, a way to
/// show an error, and a way to force navigation.
pub trait Navigator: Send + Sync {
    /// Current location path, e.g. `/login` or `/files/3`
    fn current_path(&self) -> String;

    /// Surface a user-visible error message
    fn notify_error(&self, message: &str);

    /// Force navigation to `path`
    fn redirect(&self, path: &str);
}

#[derive(Debug, Default)]
struct HeadlessState {
    path: String,
    notifications: Vec<String>,
    redirects: Vec<String>,
}

/// Navigator for hosts without a router (CLI, tests).
///
/// Tracks the current path in memory, logs notifications through `tracing`
/// and records everything so callers can inspect what happened.
#[derive(Debug)]
pub struct HeadlessNavigator {
    state: Mutex<HeadlessState>,
}

impl HeadlessNavigator {
    pub fn new(initial_path: &str) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                path: initial_path.to_string(),
                ..HeadlessState::default()
            }),
        }
    }

    /// Move to `path` without it counting as a forced redirect
    pub fn visit(&self, path: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.path = path.to_string();
        }
    }

    pub fn notifications(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.notifications.clone())
            .unwrap_or_default()
    }

    pub fn redirects(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.redirects.clone())
            .unwrap_or_default()
    }
}

impl Default for HeadlessNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for HeadlessNavigator {
    fn current_path(&self) -> String {
        self.state
            .lock()
            .map(|s| s.path.clone())
            .unwrap_or_default()
    }

    fn notify_error(&self, message: &str) {
        warn!(message, "Session notice");
        if let Ok(mut state) = self.state.lock() {
            state.notifications.push(message.to_string());
        }
    }

    fn redirect(&self, path: &str) {
        info!(path, "Redirecting");
        if let Ok(mut state) = self.state.lock() {
            state.path = path.to_string();
            state.redirects.push(path.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_moves_and_records() {
        let nav = HeadlessNavigator::new("/files");
        nav.redirect(LOGIN_PATH);
        assert_eq!(nav.current_path(), LOGIN_PATH);
        assert_eq!(nav.redirects(), vec![LOGIN_PATH.to_string()]);
    }

    #[test]
    fn test_visit_is_not_a_redirect() {
        let nav = HeadlessNavigator::default();
        nav.visit("/upload");
        assert_eq!(nav.current_path(), "/upload");
        assert!(nav.redirects().is_empty());
    }
}
