//! User-scoped UI artifacts stored next to the session.
//!
//! The frontend keeps a few convenience values per signed-in user so work
//! in progress survives a reload:
//! - manual text input typed into the correction editor
//! - the last table preview
//! - the last processed file record
//!
//! Keys are namespaced by user id (`table_preview_42`). They are purged when
//! that user logs out or a different user logs in.

pub mod manager;

pub use manager::{
    last_record_key, manual_text_input_key, purge_legacy, purge_user, scoped_keys,
    table_preview_key, CachedData, ScopedCache, LEGACY_MANUAL_TEXT_INPUT_KEY,
};
