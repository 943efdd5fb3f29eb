//! Telegram update deduplication cache

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default dedup TTL (5 minutes)
const DEDUP_TTL_SECS: u64 = 300;

/// Maximum dedup cache entries
const DEDUP_MAX_ENTRIES: usize = 2000;

/// Telegram update deduplication cache
///
/// Prevents queueing the same update twice when a long poll is retried
/// before its offset was acknowledged. Uses TTL-based eviction with a hard
/// cap on entries.
#[derive(Debug)]
pub struct UpdateDedup {
    cache: HashMap<i64, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for UpdateDedup {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEDUP_TTL_SECS), DEDUP_MAX_ENTRIES)
    }
}

impl UpdateDedup {
    /// Create a cache with a custom TTL and capacity
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            cache: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Check if `update_id` has been seen recently.
    ///
    /// Returns `true` for a duplicate (already seen within TTL).
    /// Returns `false` on first sight and records the id.
    pub fn is_duplicate(&mut self, update_id: i64) -> bool {
        let now = Instant::now();

        if let Some(ts) = self.cache.get(&update_id)
            && now.duration_since(*ts) < self.ttl
        {
            return true;
        }

        if self.cache.len() >= self.max_entries {
            self.cache.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }

        // Still full after eviction: drop the oldest entry
        if self.cache.len() >= self.max_entries
            && let Some(oldest) = self
                .cache
                .iter()
                .min_by_key(|(_, ts)| **ts)
                .map(|(id, _)| *id)
        {
            self.cache.remove(&oldest);
        }

        self.cache.insert(update_id, now);
        false
    }

    /// Number of remembered updates
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is remembered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
