//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache entries at the configured interval
//! - Over-Limit Eviction: Drops the soonest-to-expire entries once the count limit is reached
//!
//! Both run under a supervisor that restarts them after a panic.

mod cleanup;
mod eviction;
mod supervisor;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::LocalCache;

pub use cleanup::spawn_cleanup_task;
pub use eviction::spawn_eviction_task;
pub use supervisor::{run_blocking, spawn_supervised};

/// Handles to the background tasks of one cache.
#[derive(Debug)]
pub struct MaintenanceTasks {
    /// Expiry sweep
    pub cleanup: JoinHandle<()>,
    /// Over-limit eviction sweep
    pub eviction: JoinHandle<()>,
}

impl MaintenanceTasks {
    /// Stops both tasks.
    pub fn abort(&self) {
        self.cleanup.abort();
        self.eviction.abort();
    }
}

/// Starts the expiry and over-limit sweeps with the cache's configured intervals.
pub fn spawn_maintenance_tasks<V>(cache: Arc<LocalCache<V>>) -> MaintenanceTasks
where
    V: Send + Sync + 'static,
{
    let expire_period = cache.config().expire_period();
    let eviction_period = cache.config().eviction_period();
    MaintenanceTasks {
        cleanup: spawn_cleanup_task(cache.clone(), expire_period),
        eviction: spawn_eviction_task(cache, eviction_period),
    }
}
