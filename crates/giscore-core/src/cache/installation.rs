// SPDX-License-Identifier: Apache-2.0

//! Installation access token cache.
//!
//! Holds two kinds of entry per repository:
//! - `installation-id:{owner}/{repo}` - the App installation id
//! - `access-token:{owner}/{repo}` - the installation access token
//!
//! A token is servable only while `now < expires_at - EXPIRY_BUFFER`. The TTL
//! handed to the backing store subtracts the same buffer, so the store's own
//! eviction and the read-side check agree.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{KeyValueStore, MemoryStore};
use crate::Result;
use crate::error::GiscoreError;
use crate::github::RepoKey;

/// Safety margin so a token never expires mid-request.
pub const EXPIRY_BUFFER: Duration = Duration::minutes(5);

/// Default lifetime of a cached installation id.
pub const DEFAULT_INSTALLATION_ID_TTL: Duration = Duration::minutes(60);

/// A cached installation access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCacheEntry {
    /// Installation the token was issued for.
    pub installation_id: u64,
    /// The installation access token.
    pub token: String,
    /// Server-declared absolute expiry.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenCacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCacheEntry")
            .field("installation_id", &self.installation_id)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenCacheEntry {
    /// Returns the token as a secret.
    #[must_use]
    pub fn secret(&self) -> SecretString {
        SecretString::from(self.token.clone())
    }

    /// Check if the token can still be handed out at `now`.
    #[must_use]
    pub fn is_servable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - EXPIRY_BUFFER
    }

    /// Store-level TTL for this entry, or `None` if it is already inside the buffer.
    #[must_use]
    pub fn store_ttl_at(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let secs = (self.expires_at - EXPIRY_BUFFER - now).num_seconds();
        u64::try_from(secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs)
    }
}

fn token_key(repo: &RepoKey) -> String {
    format!("access-token:{repo}")
}

fn installation_key(repo: &RepoKey) -> String {
    format!("installation-id:{repo}")
}

/// Repository-keyed cache of installation ids and access tokens.
///
/// Cheap to clone; clones share the backing store.
#[derive(Clone)]
pub struct TokenCache {
    store: Arc<dyn KeyValueStore>,
    installation_id_ttl: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("installation_id_ttl", &self.installation_id_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Creates a cache over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            installation_id_ttl: DEFAULT_INSTALLATION_ID_TTL,
        }
    }

    /// Overrides how long installation ids are kept.
    #[must_use]
    pub fn with_installation_id_ttl(mut self, ttl: Duration) -> Self {
        self.installation_id_ttl = ttl;
        self
    }

    /// Returns the cached token for `repo` if it is still servable.
    ///
    /// A stale or unreadable entry is treated as a miss and deleted.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn get(&self, repo: &RepoKey) -> Result<Option<TokenCacheEntry>> {
        let key = token_key(repo);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let entry: TokenCacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable token cache entry");
                self.store.remove(&key).await?;
                return Ok(None);
            }
        };

        if !entry.is_servable_at(Utc::now()) {
            debug!(expires_at = %entry.expires_at, "Cached token inside expiry buffer");
            self.store.remove(&key).await?;
            return Ok(None);
        }

        debug!("Token cache hit");
        Ok(Some(entry))
    }

    /// Stores `entry` for `repo`.
    ///
    /// No-op when the entry would expire (buffer included) immediately.
    #[instrument(skip(self, entry), fields(repo = %repo, expires_at = %entry.expires_at))]
    pub async fn set(&self, repo: &RepoKey, entry: &TokenCacheEntry) -> Result<()> {
        let Some(ttl) = entry.store_ttl_at(Utc::now()) else {
            debug!("Not caching token that is already inside the expiry buffer");
            return Ok(());
        };

        let raw = serde_json::to_string(entry).map_err(|e| GiscoreError::Storage {
            message: e.to_string(),
        })?;
        self.store.set(&token_key(repo), raw, Some(ttl)).await
    }

    /// Removes the cached token for `repo`.
    pub async fn remove(&self, repo: &RepoKey) -> Result<()> {
        self.store.remove(&token_key(repo)).await
    }

    /// Returns the cached installation id for `repo`.
    pub async fn installation_id(&self, repo: &RepoKey) -> Result<Option<u64>> {
        let key = installation_key(repo);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        if let Ok(id) = raw.parse::<u64>() {
            Ok(Some(id))
        } else {
            warn!(repo = %repo, "Discarding unreadable installation id entry");
            self.store.remove(&key).await?;
            Ok(None)
        }
    }

    /// Caches the installation id for `repo`.
    pub async fn set_installation_id(&self, repo: &RepoKey, installation_id: u64) -> Result<()> {
        let ttl = self.installation_id_ttl.to_std().ok();
        self.store
            .set(&installation_key(repo), installation_id.to_string(), ttl)
            .await
    }

    /// Drops both the installation id and the token for `repo`.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn invalidate(&self, repo: &RepoKey) -> Result<()> {
        self.store.remove(&installation_key(repo)).await?;
        self.store.remove(&token_key(repo)).await?;
        debug!("Invalidated cached installation credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoKey {
        RepoKey::new("Octo", "Blog").unwrap()
    }

    fn entry(expires_in: Duration) -> TokenCacheEntry {
        TokenCacheEntry {
            installation_id: 42,
            token: "ghs_test".to_string(),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = TokenCache::default();
        let e = entry(Duration::hours(1));
        cache.set(&repo(), &e).await.unwrap();
        assert_eq!(cache.get(&repo()).await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn test_set_expired_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let cache = TokenCache::new(store.clone());
        cache
            .set(&repo(), &entry(Duration::minutes(-1)))
            .await
            .unwrap();
        assert!(store.is_empty().await);
        assert!(cache.get(&repo()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_inside_buffer_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let cache = TokenCache::new(store.clone());
        cache
            .set(&repo(), &entry(Duration::minutes(4)))
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_stale_entry_is_removed() {
        // Bypass `set` to plant an entry the buffer-aware write would refuse.
        let store = Arc::new(MemoryStore::new());
        let cache = TokenCache::new(store.clone());
        let stale = entry(Duration::minutes(3));
        store
            .set(
                "access-token:octo/blog",
                serde_json::to_string(&stale).unwrap(),
                None,
            )
            .await
            .unwrap();

        assert!(cache.get(&repo()).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_unreadable_entry_is_removed() {
        let store = Arc::new(MemoryStore::new());
        let cache = TokenCache::new(store.clone());
        store
            .set("access-token:octo/blog", "not json".to_string(), None)
            .await
            .unwrap();

        assert!(cache.get(&repo()).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_installation_id_round_trip() {
        let cache = TokenCache::default();
        assert_eq!(cache.installation_id(&repo()).await.unwrap(), None);
        cache.set_installation_id(&repo(), 7).await.unwrap();
        assert_eq!(cache.installation_id(&repo()).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_invalidate_drops_both() {
        let cache = TokenCache::default();
        cache.set_installation_id(&repo(), 7).await.unwrap();
        cache
            .set(&repo(), &entry(Duration::hours(1)))
            .await
            .unwrap();

        cache.invalidate(&repo()).await.unwrap();

        assert!(cache.installation_id(&repo()).await.unwrap().is_none());
        assert!(cache.get(&repo()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_are_case_insensitive() {
        let cache = TokenCache::default();
        cache
            .set(&repo(), &entry(Duration::hours(1)))
            .await
            .unwrap();
        let lower = RepoKey::new("octo", "blog").unwrap();
        assert!(cache.get(&lower).await.unwrap().is_some());
    }

    #[test]
    fn test_store_ttl_subtracts_buffer() {
        let now = Utc::now();
        let e = TokenCacheEntry {
            installation_id: 1,
            token: "t".to_string(),
            expires_at: now + Duration::minutes(60),
        };
        assert_eq!(
            e.store_ttl_at(now),
            Some(std::time::Duration::from_secs(55 * 60))
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let e = entry(Duration::hours(1));
        assert!(!format!("{e:?}").contains("ghs_test"));
    }
}
