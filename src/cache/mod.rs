//! Cache Module
//!
//! Provides an in-process TTL cache built on a skip-list sorted set, with
//! lazy expiration on read and bulk removal by score or rank.

mod entry;
mod skiplist;
mod sorted_set;
mod stats;
mod store;


// Re-export public types
pub use entry::{now_unix, Element};
pub use skiplist::{IndexEntry, SkipList, MAX_LEVEL};
pub use sorted_set::SortedSet;
pub use stats::{CacheStats, StatsRecorder};
pub use store::LocalCache;

// == Public Constants ==
/// TTL value that keeps a live key's current expiration
pub const TTL_KEEP: i64 = 0;

/// Maximum TTL in seconds; longer TTLs are clamped
pub const MAX_TTL_SECS: i64 = 7200;

/// TTL used by a KEEP write when the key is absent or expired
pub const DEFAULT_TTL_SECS: i64 = 30;

/// Default entry count limit
pub const DEFAULT_COUNT_LIMIT: usize = 1_000_000;

/// Lowest accepted entry count limit
pub const MIN_COUNT_LIMIT: usize = 10_000;

/// Default expiry sweep interval in seconds
pub const DEFAULT_EXPIRE_INTERVAL_SECS: u64 = 5;

/// Longest accepted expiry sweep interval in seconds
pub const MAX_EXPIRE_INTERVAL_SECS: u64 = 300;

/// Share of the count limit removed by one over-limit sweep
pub const DEFAULT_EVICTION_FRACTION: f64 = 0.15;

/// Pending index jobs before writers block
pub const DEFAULT_QUEUE_CAPACITY: usize = 20_000;
