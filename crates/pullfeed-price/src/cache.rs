//! Read-through cache for latest-price lookups.
//!
//! Entries are keyed by the sorted, deduplicated feed set and expire once
//! older than the TTL. Expired entries are purged before every lookup. A zero
//! TTL disables the cache entirely.

use std::collections::HashMap;
use std::time::Duration;

use pullfeed_types::{FeedId, PriceUpdate};
use tokio::sync::Mutex;
use tracing::trace;

/// Cache of latest-price updates, shared process-wide behind an `Arc`.
pub struct PriceCache {
    ttl: Duration,
    entries: Mutex<HashMap<Vec<FeedId>, PriceUpdate>>,
}

impl PriceCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Configured time to live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether lookups can ever hit.
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Canonical key for a feed set.
    pub fn key(feed_ids: &[FeedId]) -> Vec<FeedId> {
        let mut key = feed_ids.to_vec();
        key.sort_unstable();
        key.dedup();
        key
    }

    /// Look up a fresh entry for `key`.
    pub async fn get(&self, key: &[FeedId]) -> Option<PriceUpdate> {
        if !self.is_enabled() {
            return None;
        }
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        let before = entries.len();
        entries.retain(|_, update| update.fetched_at.elapsed() < ttl);
        if entries.len() != before {
            trace!(purged = before - entries.len(), "expired price updates purged");
        }
        entries.get(key).cloned()
    }

    /// Store `update` under `key`. A no-op when the cache is disabled.
    pub async fn insert(&self, key: Vec<FeedId>, update: PriceUpdate) {
        if !self.is_enabled() {
            return;
        }
        self.entries.lock().await.insert(key, update);
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::disabled()
    }
}
