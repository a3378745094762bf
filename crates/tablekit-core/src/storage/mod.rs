//! Durable key/value storage for session state.
//!
//! The session layer only needs string keys mapped to string values, the
//! same contract a browser's local storage offers. Two backends exist:
//! - `FileStore`: a JSON file in the cache directory, survives restarts
//! - `MemoryStore`: process-local, used by tests and ephemeral hosts

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use anyhow::Result;

/// String key/value storage shared by the gate and the session store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}
