//! Integration Tests for the Cache
//!
//! Exercises the public API end to end: TTL rules, lazy expiration, bulk
//! removal by score and rank, the background sweeps and concurrent writers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::thread::sleep;
use std::time::Duration;

use fast_cache::cache::{MIN_COUNT_LIMIT, MAX_TTL_SECS};
use fast_cache::{spawn_maintenance_tasks, CacheError, Config, LocalCache, SortedSet, TTL_KEEP};

// == Helper Functions ==

fn create_test_cache() -> LocalCache<String> {
    LocalCache::new(Config {
        count_limit: MIN_COUNT_LIMIT,
        ..Config::default()
    })
    .unwrap()
}

// == Point Operations ==

#[test]
fn test_set_then_get_returns_value_and_ttl() {
    let cache = create_test_cache();

    for (i, ttl) in [5i64, 60, 3600].into_iter().enumerate() {
        let key = format!("key{i}");
        cache.set(&key, format!("value{i}"), ttl).unwrap();

        let (value, remaining) = cache.get(&key).unwrap();
        assert_eq!(value, format!("value{i}"));
        assert!(remaining > 0 && remaining <= ttl);
    }
}

#[test]
fn test_expired_key_reads_as_absent_before_sweep() {
    let cache = create_test_cache();
    cache.set("x", "v".to_string(), 1).unwrap();

    sleep(Duration::from_millis(1200));

    assert!(cache.get("x").is_none());
    assert!(cache.ttl("x").is_none());
    // Still occupying the table until a sweep runs
    assert_eq!(cache.sorted_set().map_len(), 1);
}

#[test]
fn test_keep_preserves_remaining_ttl() {
    let cache = create_test_cache();
    cache.set("x", "v1".to_string(), 100).unwrap();
    let before = cache.ttl("x").unwrap();

    cache.set("x", "v2".to_string(), TTL_KEEP).unwrap();

    let (value, after) = cache.get("x").unwrap();
    assert_eq!(value, "v2");
    assert!(after <= before && before - after <= 1);
}

#[test]
fn test_keep_after_expiry_uses_default_ttl() {
    let cache = create_test_cache();
    cache.set("x", "v1".to_string(), 1).unwrap();
    sleep(Duration::from_millis(1200));

    cache.set("x", "v2".to_string(), TTL_KEEP).unwrap();

    let (value, ttl) = cache.get("x").unwrap();
    assert_eq!(value, "v2");
    assert!(ttl > 1 && ttl <= cache.config().default_ttl);
}

#[test]
fn test_negative_ttl_is_rejected() {
    let cache = create_test_cache();

    let err = cache.set("x", "v".to_string(), -100).unwrap_err();
    assert!(matches!(err, CacheError::InvalidTtl(-100)));
    assert!(cache.is_empty());
}

#[test]
fn test_ttl_is_clamped() {
    let cache = create_test_cache();
    cache.set("x", "v".to_string(), 3_000_000).unwrap();
    assert!(cache.ttl("x").unwrap() <= MAX_TTL_SECS);
}

#[test]
fn test_delete() {
    let cache = create_test_cache();
    cache.set("x", "v".to_string(), 60).unwrap();

    assert!(cache.delete("x").unwrap());
    assert!(!cache.delete("x").unwrap());
    assert!(cache.get("x").is_none());

    cache.sorted_set().flush().unwrap();
    assert_eq!(cache.sorted_set().index_len(), 0);
}

#[test]
fn test_values_can_be_any_type() {
    #[derive(Debug, Clone, PartialEq)]
    struct Person {
        name: String,
        age: u32,
    }

    let cache = LocalCache::new(Config::default()).unwrap();
    let jack = Person {
        name: "Jack".to_string(),
        age: 18,
    };
    cache.set("jack", Arc::new(jack.clone()), 60).unwrap();

    let (value, _) = cache.get("jack").unwrap();
    assert_eq!(*value, jack);
}

// == Bulk Removal ==

#[test]
fn test_remove_by_rank_takes_soonest_to_expire() {
    let cache = create_test_cache();
    for ttl in 1..=20i64 {
        cache.set(&format!("key{ttl}"), "v".to_string(), ttl * 10).unwrap();
    }
    let set = cache.sorted_set();
    set.flush().unwrap();

    assert_eq!(set.remove_by_rank(0, 5), 5);

    for ttl in 1..=5 {
        assert!(cache.get(&format!("key{ttl}")).is_none());
    }
    for ttl in 6..=20 {
        assert!(cache.get(&format!("key{ttl}")).is_some());
    }
    assert_eq!(cache.len(), 15);
    assert_eq!(cache.len(), set.index_len());
}

#[test]
fn test_remove_expired_is_idempotent() {
    let cache = create_test_cache();
    cache.set("short1", "v".to_string(), 1).unwrap();
    cache.set("short2", "v".to_string(), 1).unwrap();
    cache.set("long", "v".to_string(), 600).unwrap();
    cache.sorted_set().flush().unwrap();

    sleep(Duration::from_millis(1200));

    assert_eq!(cache.remove_expired(), 2);
    assert_eq!(cache.remove_expired(), 0);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_range_by_score_orders_by_expiry() {
    let cache = create_test_cache();
    cache.set("late", "v".to_string(), 300).unwrap();
    cache.set("soon", "v".to_string(), 10).unwrap();
    cache.set("mid", "v".to_string(), 100).unwrap();
    let set = cache.sorted_set();
    set.flush().unwrap();

    let ascending: Vec<_> = set
        .range_by_score(i64::MIN, i64::MAX, 0, None, false)
        .into_iter()
        .map(|e| e.member)
        .collect();
    assert_eq!(ascending, vec!["soon", "mid", "late"]);

    let newest = set.range_by_score(i64::MIN, i64::MAX, 0, Some(1), true);
    assert_eq!(newest[0].member, "late");
}

// == Background Tasks ==

#[tokio::test]
async fn test_count_limit_converges() {
    let cache = Arc::new(
        LocalCache::new(Config {
            count_limit: MIN_COUNT_LIMIT,
            expire_interval: 1,
            eviction_interval_ms: 100,
            ..Config::default()
        })
        .unwrap(),
    );
    for i in 0..MIN_COUNT_LIMIT + 500 {
        cache.set(&format!("k{i}"), i, 600).unwrap();
    }
    cache.sorted_set().flush().unwrap();
    assert!(cache.len() >= cache.count_limit());

    let tasks = spawn_maintenance_tasks(cache.clone());
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(cache.len() < cache.count_limit());
    assert_eq!(cache.len(), cache.sorted_set().index_len());
    assert_eq!(cache.len(), cache.sorted_set().map_len());

    tasks.abort();
}

#[tokio::test]
async fn test_expiry_sweep_reclaims_entries() {
    let cache = Arc::new(
        LocalCache::new(Config {
            expire_interval: 1,
            ..Config::default()
        })
        .unwrap(),
    );
    cache.set("short", "v".to_string(), 1).unwrap();
    cache.set("long", "v".to_string(), 600).unwrap();

    let tasks = spawn_maintenance_tasks(cache.clone());
    tokio::time::sleep(Duration::from_millis(3200)).await;

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.sorted_set().map_len(), 1);
    assert!(cache.get("long").is_some());

    tasks.abort();
}

// == Concurrency ==

#[test]
fn test_concurrent_writers_converge() {
    const WRITERS: usize = 8;
    const KEYS_PER_WRITER: usize = 500;

    let set: SortedSet<usize> = SortedSet::new(64).unwrap();

    thread::scope(|scope| {
        for writer in 0..WRITERS {
            let set = &set;
            scope.spawn(move || {
                for i in 0..KEYS_PER_WRITER {
                    let member = format!("w{writer}-k{i}");
                    set.add(&member, i as i64, writer).unwrap();
                    // Rescore so the last write must win in the index
                    set.add(&member, (i * 2 + writer) as i64, writer).unwrap();
                }
            });
        }
    });
    set.flush().unwrap();

    let mut expected = BTreeMap::new();
    for writer in 0..WRITERS {
        for i in 0..KEYS_PER_WRITER {
            expected.insert(format!("w{writer}-k{i}"), (i * 2 + writer) as i64);
        }
    }

    assert_eq!(set.len(), WRITERS * KEYS_PER_WRITER);
    assert_eq!(set.index_len(), WRITERS * KEYS_PER_WRITER);

    let indexed: BTreeMap<String, i64> = set
        .range_by_score(i64::MIN, i64::MAX, 0, None, false)
        .into_iter()
        .map(|e| (e.member, e.score))
        .collect();
    assert_eq!(indexed, expected);
}

#[test]
fn test_concurrent_writers_on_shared_keys() {
    let cache: LocalCache<usize> = LocalCache::new(Config::default()).unwrap();

    thread::scope(|scope| {
        for writer in 0..4usize {
            let cache = &cache;
            scope.spawn(move || {
                for round in 0..200usize {
                    let key = format!("shared{}", round % 10);
                    cache.set(&key, writer, (round % 50 + 1) as i64).unwrap();
                }
            });
        }
    });
    cache.sorted_set().flush().unwrap();

    // One node per key no matter how the writers interleaved
    assert_eq!(cache.len(), 10);
    assert_eq!(cache.sorted_set().index_len(), 10);
}
