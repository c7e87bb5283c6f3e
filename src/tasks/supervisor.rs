//! Task Supervisor
//!
//! Keeps a background loop alive by respawning it after a panic.

use std::future::Future;
use std::panic;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Pause before a panicked task is restarted.
const RESTART_DELAY: Duration = Duration::from_millis(100);

/// Aborts the wrapped task when dropped, so aborting the supervisor also
/// stops the task it is watching.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawns `task()` on the runtime and respawns it every time it panics.
///
/// The supervisor exits when the task returns normally. Aborting the
/// returned handle stops both the supervisor and the running task.
pub fn spawn_supervised<F, Fut>(name: &'static str, task: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let mut running = AbortOnDrop(tokio::spawn(task()));
            match (&mut running.0).await {
                Ok(()) => {
                    info!(task = name, "background task finished");
                    break;
                }
                Err(err) if err.is_panic() => {
                    error!(task = name, "background task panicked, restarting");
                    tokio::time::sleep(RESTART_DELAY).await;
                }
                Err(_) => {
                    info!(task = name, "background task cancelled");
                    break;
                }
            }
        }
    })
}

/// Runs a synchronous sweep on the blocking thread pool.
///
/// The sweeps take the index lock and touch table shards, which can be held
/// by a writer waiting on a full queue, so they stay off the async workers.
/// A panic in `sweep` is re-raised in the calling task, where the
/// supervisor picks it up. Returns None if the runtime is shutting down.
pub async fn run_blocking<T, F>(sweep: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(sweep).await {
        Ok(out) => Some(out),
        Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
        Err(err) => {
            warn!("blocking sweep cancelled: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_supervisor_restarts_after_panic() {
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let handle = spawn_supervised("flaky", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("simulated failure");
                }
            }
        });

        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_supervisor_abort_stops_task() {
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        let handle = spawn_supervised("ticker", move || {
            let counter = counter.clone();
            async move {
                loop {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished(), "Supervisor should be finished after abort");

        let after_abort = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_abort);
    }

    #[tokio::test]
    async fn test_run_blocking_keeps_runtime_responsive() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        // A sweep stuck on a contended lock must not stall this
        // single-threaded runtime.
        let out = run_blocking(|| {
            std::thread::sleep(Duration::from_millis(300));
            7
        })
        .await;

        assert_eq!(out, Some(7));
        assert!(ticks.load(Ordering::SeqCst) >= 5);
        ticker.abort();
    }

    #[tokio::test]
    async fn test_run_blocking_panic_restarts_task() {
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let handle = spawn_supervised("flaky-sweep", move || {
            let counter = counter.clone();
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                run_blocking(move || {
                    if attempt == 0 {
                        panic!("simulated sweep failure");
                    }
                })
                .await;
            }
        });

        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
