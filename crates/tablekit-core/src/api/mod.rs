//! Transport gate for the tablekit backend.
//!
//! Every backend call goes through `Gate`, which attaches the stored bearer
//! token on the way out and inspects failures on the way back. A rejected
//! session (401 outside the login endpoint, or a 404 saying the account is
//! gone) clears the persisted token and user and sends the host back to the
//! login view through the injected `Navigator`.

pub mod error;
pub mod gate;
pub mod navigator;

pub use error::ApiError;
pub use gate::{classify_failure, Gate, GateAction, InvalidationListener, InvalidationReason};
pub use navigator::{HeadlessNavigator, Navigator, LOGIN_PATH};
