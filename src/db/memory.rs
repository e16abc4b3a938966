// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process [`Store`] backed by a concurrent map.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{glob_match, Store, StoreError};

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Memory store with per-key TTL. Expired keys are dropped on read and
/// swept on every write.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, v| v.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of keys currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .map(|v| (v.expires_at > now).then(|| v.bytes.clone()));

        match value {
            Some(Some(bytes)) => Ok(Some(bytes)),
            Some(None) => {
                self.entries.remove_if(key, |_, v| v.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let pruned = self.prune_expired();
        if pruned > 0 {
            tracing::debug!(pruned, "Store pruned expired keys");
        }
        self.entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, pattern: &str) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !glob_match(pattern, key));
        let removed = before.saturating_sub(self.entries.len());
        tracing::debug!(pattern, removed, "Store invalidated");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_expired_keys_are_swept_on_write() {
        let store = MemoryStore::new();
        for key in ["a", "b", "c"] {
            store
                .set(key, b"v".to_vec(), Duration::from_secs(10))
                .await
                .unwrap();
        }
        store
            .set("long", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.len(), 4);

        tokio::time::advance(Duration::from_secs(11)).await;
        store
            .set("d", b"v".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("long").await.unwrap().is_some());
        assert!(store.get("d").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_expired_reports_removed() {
        let store = MemoryStore::new();
        store.set("a", vec![1], Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.prune_expired(), 0);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.prune_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_pattern_invalidation() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        for key in [
            "leaderboard:team-1:jan",
            "leaderboard:open:jan",
            "leaderboard:team-1:feb",
            "leaderboard:team-2:feb",
        ] {
            store.set(key, vec![1], ttl).await.unwrap();
        }

        assert_eq!(store.invalidate("leaderboard:*:jan").await.unwrap(), 2);
        assert_eq!(store.invalidate("leaderboard:team-1:*").await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("leaderboard:team-2:feb").await.unwrap().is_some());
    }
}
