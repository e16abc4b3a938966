//! Key-value store layer.
//!
//! Leaderboards are written through to a [`Store`] so a restarted process
//! can serve the last computed value instead of recomputing from relays.

pub mod memory;

use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryStore;

/// Key prefixes as constants.
pub mod keys {
    pub const LEADERBOARD: &str = "leaderboard";
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// TTL-based byte store with pattern invalidation.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Remove every key matching `pattern` (`*` matches any run of characters).
    ///
    /// Returns the number of keys removed.
    async fn invalidate(&self, pattern: &str) -> Result<usize, StoreError>;
}

/// Glob match where `*` matches any (possibly empty) run of characters.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let remaining: Vec<&str> = parts.collect();
    let Some((last, middle)) = remaining.split_last() else {
        // No `*` at all: exact match.
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
