//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::LocalCache;
use crate::tasks::{run_blocking, spawn_supervised};

/// Spawns a supervised task that purges expired entries every `interval`.
///
/// Each pass removes every entry whose expiration score has been reached,
/// in one bulk removal under the index lock, on the blocking thread pool.
/// The task is restarted if it panics.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(LocalCache::<String>::new(Config::default())?);
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(5));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<V>(cache: Arc<LocalCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    spawn_supervised("ttl-cleanup", move || {
        let cache = cache.clone();
        async move {
            info!(
                "Starting TTL cleanup task with interval of {:?}",
                interval
            );

            loop {
                tokio::time::sleep(interval).await;

                let sweep = cache.clone();
                let Some(removed) = run_blocking(move || sweep.remove_expired()).await else {
                    break;
                };
                if removed > 0 {
                    info!("TTL cleanup: removed {} expired entries", removed);
                } else {
                    debug!("TTL cleanup: no expired entries found");
                }
            }
        }
    })
}
