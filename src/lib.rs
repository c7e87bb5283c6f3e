//! Fast Cache - An in-process TTL cache
//!
//! Entries are ordered by expiration time in a skip-list sorted set, so
//! expired keys are purged in bulk and the soonest-to-expire keys are
//! evicted first once a count limit is reached.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{LocalCache, SortedSet, TTL_KEEP};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_maintenance_tasks, MaintenanceTasks};
