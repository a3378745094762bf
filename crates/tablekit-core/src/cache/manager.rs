use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

/// Unscoped key written by older frontends, before per-user namespacing
pub const LEGACY_MANUAL_TEXT_INPUT_KEY: &str = "manual_text_input";

pub fn manual_text_input_key(user_id: i64) -> String {
    format!("manual_text_input_{}", user_id)
}

pub fn table_preview_key(user_id: i64) -> String {
    format!("table_preview_{}", user_id)
}

pub fn last_record_key(user_id: i64) -> String {
    format!("last_record_{}", user_id)
}

/// Every key scoped to `user_id`
pub fn scoped_keys(user_id: i64) -> [String; 3] {
    [
        manual_text_input_key(user_id),
        table_preview_key(user_id),
        last_record_key(user_id),
    ]
}

/// Remove every scoped key of `user_id`. Failures are logged, not returned.
pub fn purge_user(storage: &dyn KeyValueStore, user_id: i64) {
    for key in scoped_keys(user_id) {
        if let Err(e) = storage.remove(&key) {
            warn!(key = %key, error = %e, "Failed to purge cached entry");
        }
    }
    debug!(user_id, "Purged user cache");
}

pub fn purge_legacy(storage: &dyn KeyValueStore) {
    if let Err(e) = storage.remove(LEGACY_MANUAL_TEXT_INPUT_KEY) {
        warn!(error = %e, "Failed to purge legacy cached entry");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Cached artifacts of a single user
pub struct ScopedCache {
    storage: Arc<dyn KeyValueStore>,
    user_id: i64,
}

impl ScopedCache {
    pub fn for_user(storage: Arc<dyn KeyValueStore>, user_id: i64) -> Self {
        Self { storage, user_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<T>>> {
        let Some(contents) = self.storage.get(key)? else {
            return Ok(None);
        };
        let cached = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cached entry: {}", key))?;
        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        let contents = serde_json::to_string(&CachedData::new(data))?;
        self.storage.set(key, &contents)
    }

    // ===== Manual text input =====

    /// Manual input is stored as the raw text, not wrapped
    pub fn load_manual_text_input(&self) -> Result<Option<String>> {
        self.storage.get(&manual_text_input_key(self.user_id))
    }

    pub fn save_manual_text_input(&self, text: &str) -> Result<()> {
        self.storage.set(&manual_text_input_key(self.user_id), text)
    }

    // ===== Table preview =====

    pub fn load_table_preview<T: DeserializeOwned>(&self) -> Result<Option<CachedData<T>>> {
        self.load(&table_preview_key(self.user_id))
    }

    pub fn save_table_preview<T: Serialize>(&self, preview: &T) -> Result<()> {
        self.save(&table_preview_key(self.user_id), preview)
    }

    // ===== Last record =====

    pub fn load_last_record<T: DeserializeOwned>(&self) -> Result<Option<CachedData<T>>> {
        self.load(&last_record_key(self.user_id))
    }

    pub fn save_last_record<T: Serialize>(&self, record: &T) -> Result<()> {
        self.save(&last_record_key(self.user_id), record)
    }

    /// Remove everything this cache holds
    pub fn clear(&self) {
        purge_user(self.storage.as_ref(), self.user_id);
    }
}

// ============================================================================
// Tests
// ============================================================================
