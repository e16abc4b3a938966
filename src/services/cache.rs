// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stale-while-revalidate leaderboard cache.
//!
//! Each entry moves through fresh → stale → expired as it ages:
//!
//! - **Fresh**: served as is.
//! - **Stale**: served immediately; the first reader also gets a
//!   [`RefreshGuard`] and is responsible for recomputing. Later readers get
//!   no guard until that refresh finishes, so at most one background refresh
//!   runs per entry.
//! - **Expired**: treated as a miss; the caller recomputes synchronously.
//!
//! Entries are written through to the [`Store`] so they survive restarts.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::db::{glob_match, keys, Store};
use crate::models::{Competition, Leaderboard};

/// Age bucket of a cached leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// Result of a cache read.
pub enum CacheLookup {
    Fresh(Arc<Leaderboard>),
    Stale {
        leaderboard: Arc<Leaderboard>,
        /// Present only for the reader that should refresh the entry
        refresh: Option<RefreshGuard>,
    },
    Miss,
}

struct CacheSlot {
    leaderboard: Arc<Leaderboard>,
    stored_at: Instant,
    refreshing: bool,
}

/// Marks a background refresh as in flight; dropping it clears the mark.
pub struct RefreshGuard {
    slots: Arc<DashMap<String, CacheSlot>>,
    key: String,
}

impl RefreshGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slots.get_mut(&self.key) {
            slot.refreshing = false;
        }
    }
}

/// Cache key for a competition's leaderboard: `leaderboard:{team}:{id}`.
///
/// Competitions without a team use `open`.
pub fn leaderboard_key(competition: &Competition) -> String {
    format!(
        "{}:{}:{}",
        keys::LEADERBOARD,
        competition.team_id.as_deref().unwrap_or("open"),
        competition.id
    )
}

/// Pattern matching every cached leaderboard of a competition.
pub fn competition_pattern(competition_id: &str) -> String {
    format!("{}:*:{}", keys::LEADERBOARD, competition_id)
}

/// Pattern matching every cached leaderboard of a team.
pub fn team_pattern(team_id: &str) -> String {
    format!("{}:{}:*", keys::LEADERBOARD, team_id)
}

#[derive(Clone)]
pub struct LeaderboardCache {
    slots: Arc<DashMap<String, CacheSlot>>,
    store: Arc<dyn Store>,
    config: CacheConfig,
}

impl LeaderboardCache {
    pub fn new(store: Arc<dyn Store>, config: CacheConfig) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            store,
            config,
        }
    }

    pub fn freshness(&self, age: Duration) -> Freshness {
        if age < self.config.fresh_for {
            Freshness::Fresh
        } else if age < self.config.stale_for {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Read `key`, falling back to the store when it is not in memory.
    pub async fn lookup(&self, key: &str) -> CacheLookup {
        if !self.slots.contains_key(key) {
            self.load_from_store(key).await;
        }

        let Some(mut slot) = self.slots.get_mut(key) else {
            return CacheLookup::Miss;
        };

        match self.freshness(slot.stored_at.elapsed()) {
            Freshness::Fresh => CacheLookup::Fresh(slot.leaderboard.clone()),
            Freshness::Stale => {
                let refresh = if slot.refreshing {
                    None
                } else {
                    slot.refreshing = true;
                    Some(RefreshGuard {
                        slots: self.slots.clone(),
                        key: key.to_string(),
                    })
                };
                CacheLookup::Stale {
                    leaderboard: slot.leaderboard.clone(),
                    refresh,
                }
            }
            Freshness::Expired => {
                drop(slot);
                self.slots.remove(key);
                CacheLookup::Miss
            }
        }
    }

    /// Store a freshly computed leaderboard. The last write wins.
    pub async fn put(&self, key: &str, leaderboard: Leaderboard) -> Arc<Leaderboard> {
        let leaderboard = Arc::new(leaderboard);
        self.slots.insert(
            key.to_string(),
            CacheSlot {
                leaderboard: leaderboard.clone(),
                stored_at: Instant::now(),
                refreshing: false,
            },
        );

        match serde_json::to_vec(leaderboard.as_ref()) {
            Ok(bytes) => {
                if let Err(e) = self.store.set(key, bytes, self.config.stale_for).await {
                    tracing::warn!(key, error = %e, "Failed to persist leaderboard");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "Failed to serialize leaderboard"),
        }

        leaderboard
    }

    /// Drop every entry matching `pattern` from memory and the store.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let before = self.slots.len();
        self.slots.retain(|key, _| !glob_match(pattern, key));
        let removed = before.saturating_sub(self.slots.len());

        if let Err(e) = self.store.invalidate(pattern).await {
            tracing::warn!(pattern, error = %e, "Failed to invalidate store entries");
        }
        tracing::info!(pattern, removed, "Leaderboard cache invalidated");
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Rehydrate a slot from the store, aged by its generation time.
    async fn load_from_store(&self, key: &str) {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read leaderboard from store");
                return;
            }
        };
        let leaderboard: Leaderboard = match serde_json::from_slice(&bytes) {
            Ok(lb) => lb,
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable stored leaderboard");
                return;
            }
        };

        let age = (Utc::now() - leaderboard.generated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let Some(stored_at) = Instant::now().checked_sub(age) else {
            return;
        };

        self.slots.entry(key.to_string()).or_insert(CacheSlot {
            leaderboard: Arc::new(leaderboard),
            stored_at,
            refreshing: false,
        });
    }
}
