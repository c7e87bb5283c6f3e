//! Fast Cache - load generator
//!
//! Drives a cache with rounds of writes using random short TTLs so the
//! expiry and over-limit sweeps stay busy, logging statistics as it goes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fast_cache::{spawn_maintenance_tasks, Config, LocalCache};

/// Interval between statistics reports.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Value written for every key.
#[derive(Debug, Clone, Serialize)]
struct Person {
    name: String,
    age: u32,
    location: String,
}

/// Main entry point for the load generator.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and start its maintenance tasks
/// 4. Start the writer and the statistics reporter
/// 5. Stop everything on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fast_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Fast Cache load generator");

    let config = Config::from_env();
    info!(
        "Configuration loaded: count_limit={}, default_ttl={}s, max_ttl={}s, expire_interval={}s, eviction_fraction={}",
        config.count_limit,
        config.default_ttl,
        config.max_ttl,
        config.expire_interval,
        config.eviction_fraction
    );
    let keys_per_round = config.count_limit + config.count_limit / 5;

    let cache: Arc<LocalCache<Person>> = Arc::new(LocalCache::new(config)?);
    let tasks = spawn_maintenance_tasks(cache.clone());
    info!("Maintenance tasks started");

    let stop = Arc::new(AtomicBool::new(false));
    let writer = tokio::task::spawn_blocking({
        let cache = cache.clone();
        let stop = stop.clone();
        move || write_rounds(&cache, keys_per_round, &stop)
    });

    let reporter = tokio::spawn({
        let cache = cache.clone();
        async move {
            loop {
                tokio::time::sleep(REPORT_INTERVAL).await;
                match serde_json::to_string(&cache.stats()) {
                    Ok(stats) => info!("stats: {}", stats),
                    Err(err) => warn!("failed to encode stats: {}", err),
                }
            }
        }
    });

    shutdown_signal().await;

    stop.store(true, Ordering::Relaxed);
    reporter.abort();
    tasks.abort();
    warn!("Maintenance tasks aborted");

    writer.await??;
    tokio::task::spawn_blocking({
        let cache = cache.clone();
        move || cache.sorted_set().flush()
    })
    .await??;

    info!("Final stats: {}", serde_json::to_string(&cache.stats())?);
    info!("Shutdown complete");
    Ok(())
}

/// Rewrites `keys_per_round` keys per round with TTLs of 1..=10 seconds
/// until `stop` is raised.
fn write_rounds(
    cache: &LocalCache<Person>,
    keys_per_round: usize,
    stop: &AtomicBool,
) -> fast_cache::Result<()> {
    let person = Person {
        name: "Jack".to_string(),
        age: 18,
        location: "America".to_string(),
    };
    if let Ok(payload) = serde_json::to_string(&person) {
        info!("Writing {} keys per round with payload {}", keys_per_round, payload);
    }
    let mut rng = rand::thread_rng();

    let mut round = 0u64;
    while !stop.load(Ordering::Relaxed) {
        round += 1;
        info!("Start round {}", round);
        for i in 0..keys_per_round {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            cache.set(&i.to_string(), person.clone(), rng.gen_range(1..=10))?;
        }
    }
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
