//! Over-Limit Eviction Task
//!
//! Background task that trims the cache back under its count limit by
//! dropping the entries closest to expiry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::LocalCache;
use crate::tasks::{run_blocking, spawn_supervised};

/// Delay before the first over-limit check.
const STARTUP_DELAY: Duration = Duration::from_millis(500);

/// Spawns a supervised task that runs the over-limit sweep every `interval`.
///
/// Each pass is a no-op while the entry count is below the count limit.
/// The sweep itself runs on the blocking thread pool.
pub fn spawn_eviction_task<V>(cache: Arc<LocalCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    spawn_supervised("over-limit-eviction", move || {
        let cache = cache.clone();
        async move {
            info!(
                "Starting over-limit eviction task with interval of {:?}",
                interval
            );
            tokio::time::sleep(STARTUP_DELAY).await;

            loop {
                tokio::time::sleep(interval).await;

                let sweep = cache.clone();
                let Some(removed) = run_blocking(move || sweep.evict_over_limit()).await else {
                    break;
                };
                if removed > 0 {
                    info!(
                        "Over-limit eviction: removed {} entries, {} remaining (limit {})",
                        removed,
                        cache.len(),
                        cache.count_limit()
                    );
                } else {
                    debug!(
                        len = cache.len(),
                        limit = cache.count_limit(),
                        "over-limit eviction: under limit"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MIN_COUNT_LIMIT;
    use crate::config::Config;

    #[tokio::test]
    async fn test_eviction_task_trims_to_below_limit() {
        let cache = Arc::new(
            LocalCache::new(Config {
                count_limit: MIN_COUNT_LIMIT,
                ..Config::default()
            })
            .unwrap(),
        );
        for i in 0..MIN_COUNT_LIMIT + 200 {
            cache.set(&format!("k{i}"), i, 600).unwrap();
        }
        assert!(cache.len() >= cache.count_limit());

        let handle = spawn_eviction_task(cache.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(cache.len() < cache.count_limit());
        assert!(cache.stats().evictions > 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_eviction_task_leaves_small_cache_alone() {
        let cache = Arc::new(LocalCache::new(Config::default()).unwrap());
        cache.set("only", 1u32, 600).unwrap();

        let handle = spawn_eviction_task(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);

        handle.abort();
    }
}
