//! Cache Store Module
//!
//! TTL policy layer over the sorted set: turns relative TTLs into absolute
//! expiration scores, hides expired entries on read, and exposes the
//! expiry and over-limit sweeps run by the background tasks.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::cache::{now_unix, CacheStats, SortedSet, StatsRecorder, MIN_COUNT_LIMIT, TTL_KEEP};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Local Cache ==
/// In-process cache whose entries expire at an absolute Unix second.
///
/// Expired entries stay in memory until the next expiry sweep but are
/// never returned. When the entry count reaches the count limit, the
/// over-limit sweep drops the entries that would expire soonest.
#[derive(Debug)]
pub struct LocalCache<V> {
    /// Entries scored by expiration time
    entries: SortedSet<V>,
    /// Entry count that triggers over-limit eviction
    count_limit: AtomicUsize,
    /// Sanitized configuration
    config: Config,
    /// Performance statistics
    stats: StatsRecorder,
}

impl<V> LocalCache<V> {
    // == Constructor ==
    /// Creates an empty cache and starts its index worker.
    ///
    /// The configuration is sanitized first. Background sweeps are started
    /// separately with [`crate::tasks::spawn_maintenance_tasks`].
    pub fn new(config: Config) -> Result<Self> {
        let config = config.sanitized();
        let entries = SortedSet::new(config.queue_capacity)?;
        Ok(Self {
            entries,
            count_limit: AtomicUsize::new(config.count_limit),
            config,
            stats: StatsRecorder::new(),
        })
    }

    /// Returns the configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the underlying sorted set for range and rank queries.
    pub fn sorted_set(&self) -> &SortedSet<V> {
        &self.entries
    }

    // == Set ==
    /// Stores `value` under `key`, expiring `ttl_secs` seconds from now.
    ///
    /// - `ttl_secs == TTL_KEEP` keeps the current expiration of a live key,
    ///   or uses the configured default TTL if the key is absent or expired.
    /// - TTLs above the configured maximum are clamped.
    /// - Negative TTLs are rejected with [`CacheError::InvalidTtl`] and the
    ///   cache is left untouched.
    ///
    /// Blocks while the index mutation queue is full.
    pub fn set(&self, key: &str, value: V, ttl_secs: i64) -> Result<()> {
        let expire_at = self.expire_at(key, ttl_secs)?;
        self.entries.add(key, expire_at, value)
    }

    /// Like [`LocalCache::set`] but returns [`CacheError::Overloaded`]
    /// instead of blocking when the mutation queue is full.
    pub fn try_set(&self, key: &str, value: V, ttl_secs: i64) -> Result<()> {
        let expire_at = self.expire_at(key, ttl_secs)?;
        self.entries.try_add(key, expire_at, value)
    }

    fn expire_at(&self, key: &str, ttl_secs: i64) -> Result<i64> {
        if ttl_secs < 0 {
            debug!(key, ttl_secs, "rejected negative TTL");
            return Err(CacheError::InvalidTtl(ttl_secs));
        }

        let now = now_unix();
        if ttl_secs == TTL_KEEP {
            return Ok(match self.entries.score(key) {
                Some(score) if score > now => score,
                _ => now + self.config.default_ttl,
            });
        }
        Ok(now + ttl_secs.min(self.config.max_ttl))
    }

    // == TTL ==
    /// Returns the remaining seconds of a live key.
    pub fn ttl(&self, key: &str) -> Option<i64> {
        let now = now_unix();
        self.entries
            .score(key)
            .filter(|&score| score > now)
            .map(|score| score - now)
    }

    // == Delete ==
    /// Removes an entry by key.
    ///
    /// Returns false if the key was absent.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.entries.remove(key)
    }

    // == Count Limit ==
    /// Sets the entry count limit, clamped to [`MIN_COUNT_LIMIT`].
    pub fn set_count_limit(&self, limit: usize) {
        self.count_limit
            .store(limit.max(MIN_COUNT_LIMIT), Ordering::Relaxed);
    }

    /// Returns the current entry count limit.
    pub fn count_limit(&self) -> usize {
        self.count_limit.load(Ordering::Relaxed)
    }

    // == Length ==
    /// Returns the number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Remove Expired ==
    /// Removes every entry whose expiration has been reached.
    ///
    /// Returns the number of entries removed.
    pub fn remove_expired(&self) -> usize {
        let removed = self.entries.remove_up_to_score(now_unix());
        self.stats.record_expired(removed);
        removed
    }

    // == Evict Over Limit ==
    /// Once the entry count reaches the limit, removes the
    /// `limit * eviction_fraction` entries closest to expiring.
    ///
    /// Returns the number of entries removed.
    pub fn evict_over_limit(&self) -> usize {
        let limit = self.count_limit();
        let len = self.len();
        if len < limit {
            return 0;
        }

        let batch = ((limit as f64 * self.config.eviction_fraction) as usize).max(1);
        let removed = self.entries.remove_by_rank(0, batch);
        self.stats.record_evictions(removed);
        debug!(len, limit, removed, "evicted entries closest to expiry");
        removed
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len(), self.entries.index_len())
    }
}

impl<V: Clone> LocalCache<V> {
    // == Get ==
    /// Retrieves a value and its remaining TTL in seconds.
    ///
    /// Expired entries read as absent even before a sweep removes them.
    pub fn get(&self, key: &str) -> Option<(V, i64)> {
        let now = now_unix();
        let live = self
            .entries
            .get(key)
            .and_then(|element| element.ttl_at(now).map(|ttl| (element.value, ttl)));

        match live {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        live
    }
}
