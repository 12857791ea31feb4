// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted session store: the only state shared between contexts.
//!
//! Every write is a full-value overwrite of a single key. Two backends ship
//! with the crate: [`MemoryStore`] for a single process and [`FileStore`] for
//! contexts that share a state directory.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub const SESSION_INFO: &str = "session_info";
pub const LAST_ACTIVITY: &str = "last_activity";
pub const ACCESS_TOKEN: &str = "access_token";
pub const REFRESH_TOKEN: &str = "refresh_token";
pub const USER: &str = "user";
pub const RETURN_URL: &str = "return_url";

/// Keys removed together when a session ends.
pub const SESSION_KEYS: [&str; 5] = [SESSION_INFO, LAST_ACTIVITY, ACCESS_TOKEN, REFRESH_TOKEN, USER];

/// String-keyed JSON storage with single-key atomicity.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;
    fn set(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Read and decode a typed value. Absent keys yield `None`.
pub fn load<T: DeserializeOwned>(store: &dyn SessionStore, key: &str) -> anyhow::Result<Option<T>> {
    match store.get(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and write a typed value.
pub fn save<T: Serialize>(store: &dyn SessionStore, key: &str, value: &T) -> anyhow::Result<()> {
    store.set(key, serde_json::to_value(value)?)
}

/// Like [`load`], but store and decode errors are logged and read as absent.
pub fn load_or_warn<T: DeserializeOwned>(store: &dyn SessionStore, key: &str) -> Option<T> {
    match load(store, key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, err = %e, "session store read failed");
            None
        }
    }
}

/// Like [`save`], but failures are logged and ignored.
pub fn save_or_warn<T: Serialize>(store: &dyn SessionStore, key: &str, value: &T) {
    if let Err(e) = save(store, key, value) {
        tracing::warn!(key, err = %e, "session store write failed");
    }
}

/// Remove a key, logging (and otherwise ignoring) failures.
pub fn remove_or_warn(store: &dyn SessionStore, key: &str) {
    if let Err(e) = store.remove(key) {
        tracing::warn!(key, err = %e, "session store remove failed");
    }
}
