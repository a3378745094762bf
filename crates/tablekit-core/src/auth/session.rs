use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Storage key of the bearer token
pub const TOKEN_KEY: &str = "token";

/// Storage key of the JSON-serialized user
pub const USER_KEY: &str = "user";

/// Token stored when the backend signs a user in without issuing one
pub const PLACEHOLDER_TOKEN: &str = "authenticated";

/// User payload returned by the backend.
///
/// Only `id` is interpreted here (it namespaces cached UI data); any other
/// fields the backend sends are kept as-is and written back on persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
}

impl Session {
    pub fn new(user: User, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
        }
    }

    /// Logged in means a user is held; the token alone does not count
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
