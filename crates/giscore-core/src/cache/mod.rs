// SPDX-License-Identifier: Apache-2.0

//! Key/value storage with optional per-entry TTL.
//!
//! [`KeyValueStore`] is the pluggable backing store behind the installation
//! token cache. [`MemoryStore`] is the default in-process, volatile store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::Result;

pub mod installation;

pub use installation::{EXPIRY_BUFFER, TokenCache, TokenCacheEntry};

/// A string-keyed store of string values.
///
/// `set` is an upsert: the last writer wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any and not yet expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// In-process store. Expired entries are evicted when read, and swept
/// from the whole map on every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get(key) {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        // A TTL past the end of the clock never expires.
        let expires_at = ttl.and_then(|ttl| now.checked_add(ttl));

        let mut entries = self.entries.lock().await;
        entries.retain(|_, stored| stored.is_live(now));
        entries.insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
