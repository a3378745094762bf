//! Authentication module for managing the signed-in user.
//!
//! This module provides:
//! - `Session`, `User`: the identity/token pair and its persisted keys
//! - `SessionStore`: login, register, logout and startup restore
//!
//! The token and user are persisted under the `token` and `user` keys and
//! are always present or absent together.

pub mod session;
pub mod store;

pub use session::{Session, User, PLACEHOLDER_TOKEN, TOKEN_KEY, USER_KEY};
pub use store::{AuthOutcome, SessionStore, LOGIN_FAILED, REGISTER_FAILED};
