//! Configuration Module
//!
//! Handles loading and clamping cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{
    DEFAULT_COUNT_LIMIT, DEFAULT_EVICTION_FRACTION, DEFAULT_EXPIRE_INTERVAL_SECS,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_TTL_SECS, MAX_EXPIRE_INTERVAL_SECS, MAX_TTL_SECS,
    MIN_COUNT_LIMIT,
};

/// Lower bound for the over-limit eviction interval.
const MIN_EVICTION_INTERVAL_MS: u64 = 10;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
/// Out-of-range values are clamped by [`Config::sanitized`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Entry count at which the over-limit sweep starts evicting
    pub count_limit: usize,
    /// TTL in seconds used by a KEEP write on an absent or expired key
    pub default_ttl: i64,
    /// Upper bound applied to every TTL, in seconds
    pub max_ttl: i64,
    /// Expiry sweep interval in seconds
    pub expire_interval: u64,
    /// Over-limit eviction interval in milliseconds
    pub eviction_interval_ms: u64,
    /// Fraction of `count_limit` removed by one over-limit sweep
    pub eviction_fraction: f64,
    /// Capacity of the index mutation queue
    pub queue_capacity: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `COUNT_LIMIT` - Entry count limit (default: 1000000)
    /// - `DEFAULT_TTL` - TTL for KEEP writes on absent keys (default: 30)
    /// - `MAX_TTL` - Maximum TTL in seconds (default: 7200)
    /// - `EXPIRE_INTERVAL` - Expiry sweep frequency in seconds (default: 5)
    /// - `EVICTION_INTERVAL_MS` - Over-limit sweep frequency (default: 1000)
    /// - `EVICTION_FRACTION` - Share of the limit evicted per sweep (default: 0.15)
    /// - `QUEUE_CAPACITY` - Pending index jobs before writers block (default: 20000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            count_limit: env_or("COUNT_LIMIT", defaults.count_limit),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            max_ttl: env_or("MAX_TTL", defaults.max_ttl),
            expire_interval: env_or("EXPIRE_INTERVAL", defaults.expire_interval),
            eviction_interval_ms: env_or("EVICTION_INTERVAL_MS", defaults.eviction_interval_ms),
            eviction_fraction: env_or("EVICTION_FRACTION", defaults.eviction_fraction),
            queue_capacity: env_or("QUEUE_CAPACITY", defaults.queue_capacity),
        }
        .sanitized()
    }

    /// Clamps every field into its supported range.
    pub fn sanitized(mut self) -> Self {
        self.count_limit = self.count_limit.max(MIN_COUNT_LIMIT);
        self.max_ttl = self.max_ttl.max(1);
        self.default_ttl = self.default_ttl.clamp(1, self.max_ttl);
        if self.expire_interval == 0 {
            self.expire_interval = DEFAULT_EXPIRE_INTERVAL_SECS;
        }
        self.expire_interval = self.expire_interval.min(MAX_EXPIRE_INTERVAL_SECS);
        self.eviction_interval_ms = self.eviction_interval_ms.max(MIN_EVICTION_INTERVAL_MS);
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            self.eviction_fraction = DEFAULT_EVICTION_FRACTION;
        }
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }

    /// Expiry sweep interval as a Duration.
    pub fn expire_period(&self) -> Duration {
        Duration::from_secs(self.expire_interval)
    }

    /// Over-limit sweep interval as a Duration.
    pub fn eviction_period(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count_limit: DEFAULT_COUNT_LIMIT,
            default_ttl: DEFAULT_TTL_SECS,
            max_ttl: MAX_TTL_SECS,
            expire_interval: DEFAULT_EXPIRE_INTERVAL_SECS,
            eviction_interval_ms: 1000,
            eviction_fraction: DEFAULT_EVICTION_FRACTION,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
