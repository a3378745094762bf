//! Session client for the tablekit table-extraction service.
//!
//! - `api`: the transport gate wrapping every backend call
//! - `auth`: session model and the `SessionStore`
//! - `cache`: user-scoped UI artifacts kept next to the session
//! - `storage`: durable key/value storage backends
//! - `config`: API endpoint resolution and persisted preferences

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod storage;

pub use api::{ApiError, Gate, GateAction, HeadlessNavigator, Navigator, LOGIN_PATH};
pub use auth::{AuthOutcome, Session, SessionStore, User};
pub use cache::{CachedData, ScopedCache};
pub use config::{ApiSettings, Config, DeployMode};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
