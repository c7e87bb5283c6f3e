//! Sorted Set Module
//!
//! Pairs a concurrent point table with a skip-list index.
//!
//! Point writes land in the table synchronously; structural edits to the
//! index are queued and applied by a single worker thread under the index
//! lock. Bulk removals take the lock directly.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::cache::skiplist::{IndexEntry, SkipList};
use crate::cache::Element;
use crate::error::{CacheError, Result};

// == Index Jobs ==
/// A structural edit waiting to be applied to the index.
#[derive(Debug)]
enum IndexJob {
    Insert {
        member: String,
        score: i64,
        version: u64,
    },
    Remove {
        member: String,
        score: i64,
    },
    /// Remove-then-insert applied as one unit
    Rescore {
        member: String,
        old: i64,
        new: i64,
        version: u64,
    },
    /// Acknowledged once every earlier job has been applied
    Barrier(Sender<()>),
}

impl IndexJob {
    fn apply(self, index: &mut SkipList) {
        match self {
            IndexJob::Insert {
                member,
                score,
                version,
            } => index.insert_versioned(member, score, version),
            IndexJob::Remove { member, score } => {
                index.remove(&member, score);
            }
            IndexJob::Rescore {
                member,
                old,
                new,
                version,
            } => {
                index.remove(&member, old);
                index.insert_versioned(member, new, version);
            }
            IndexJob::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

// == Sorted Set ==
/// A set of members ordered by score, with O(1) point lookups.
///
/// The point table is always current. The index converges to it once the
/// mutation queue drains; until then the table's key set is a superset of
/// the index's members.
#[derive(Debug)]
pub struct SortedSet<V> {
    /// Point table: member to latest element
    dict: DashMap<String, Element<V>>,
    /// Ordered index, mutated only under this lock
    index: Arc<Mutex<SkipList>>,
    /// Member count confirmed by the point table
    count: AtomicI64,
    /// Source of index write versions
    versions: AtomicU64,
    /// Producer side of the index mutation queue
    jobs: Sender<IndexJob>,
}

impl<V> SortedSet<V> {
    // == Constructor ==
    /// Creates an empty sorted set whose mutation queue holds up to
    /// `queue_capacity` pending jobs, and starts its index worker.
    pub fn new(queue_capacity: usize) -> Result<Self> {
        let (jobs, queue) = bounded(queue_capacity.max(1));
        let index = Arc::new(Mutex::new(SkipList::new()));

        let worker_index = Arc::clone(&index);
        thread::Builder::new()
            .name("sorted-set-index".to_string())
            .spawn(move || run_index_worker(queue, worker_index))?;

        Ok(Self {
            dict: DashMap::new(),
            index,
            count: AtomicI64::new(0),
            versions: AtomicU64::new(1),
            jobs,
        })
    }

    // == Add ==
    /// Stores `(score, value)` for `member`, blocking while the mutation
    /// queue is full.
    ///
    /// New members queue an index insert; a changed score queues a
    /// remove-then-insert; a value-only update queues nothing.
    ///
    /// The member's table shard stays write-locked while this call waits
    /// for queue space, so point reads of other members in the same shard
    /// wait with it. Use [`SortedSet::try_add`] where reads must not stall
    /// behind a saturated queue.
    pub fn add(&self, member: &str, score: i64, value: V) -> Result<()> {
        self.upsert(member, score, value, |job| {
            self.jobs.send(job).map_err(|_| CacheError::WorkerStopped)
        })
    }

    /// Like [`SortedSet::add`] but fails with [`CacheError::Overloaded`]
    /// instead of blocking. The point table is untouched on failure.
    pub fn try_add(&self, member: &str, score: i64, value: V) -> Result<()> {
        self.upsert(member, score, value, |job| {
            self.jobs.try_send(job).map_err(|err| match err {
                TrySendError::Full(_) => CacheError::Overloaded,
                TrySendError::Disconnected(_) => CacheError::WorkerStopped,
            })
        })
    }

    fn upsert(
        &self,
        member: &str,
        score: i64,
        value: V,
        enqueue: impl FnOnce(IndexJob) -> Result<()>,
    ) -> Result<()> {
        // The shard guard is held across the enqueue so that jobs for one
        // member are queued in the same order as the table writes.
        match self.dict.entry(member.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let (old, mut version) = (current.score, current.version);
                if old != score {
                    version = self.next_version();
                    enqueue(IndexJob::Rescore {
                        member: member.to_owned(),
                        old,
                        new: score,
                        version,
                    })?;
                }
                occupied.insert(Element::new(member, score, value).with_version(version));
            }
            Entry::Vacant(vacant) => {
                let version = self.next_version();
                enqueue(IndexJob::Insert {
                    member: member.to_owned(),
                    score,
                    version,
                })?;
                vacant.insert(Element::new(member, score, value).with_version(version));
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn next_version(&self) -> u64 {
        self.versions.fetch_add(1, Ordering::Relaxed)
    }

    // == Remove ==
    /// Deletes `member` and queues its index removal.
    ///
    /// Returns false if the member was absent.
    pub fn remove(&self, member: &str) -> Result<bool> {
        match self.dict.entry(member.to_owned()) {
            Entry::Occupied(occupied) => {
                let score = occupied.get().score;
                self.jobs
                    .send(IndexJob::Remove {
                        member: member.to_owned(),
                        score,
                    })
                    .map_err(|_| CacheError::WorkerStopped)?;
                occupied.remove();
                self.count.fetch_sub(1, Ordering::SeqCst);
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    // == Length ==
    /// Returns the member count. May run ahead of the index while jobs are
    /// pending.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst).max(0) as usize
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current score of `member` without cloning its value.
    pub fn score(&self, member: &str) -> Option<i64> {
        self.dict.get(member).map(|element| element.score)
    }

    /// Returns the number of nodes currently in the index.
    pub fn index_len(&self) -> usize {
        self.index.lock().len()
    }

    /// Returns the number of entries currently in the point table.
    pub fn map_len(&self) -> usize {
        self.dict.len()
    }

    // == Flush ==
    /// Blocks until every index job queued before this call has been applied.
    pub fn flush(&self) -> Result<()> {
        let (ack, done) = bounded(1);
        self.jobs
            .send(IndexJob::Barrier(ack))
            .map_err(|_| CacheError::WorkerStopped)?;
        done.recv().map_err(|_| CacheError::WorkerStopped)
    }

    // == Remove By Score ==
    /// Removes every member with `min <= score <= max`.
    ///
    /// Returns the number of members removed from the index.
    pub fn remove_by_score(&self, min: i64, max: i64) -> usize {
        let (removed, remaining) = {
            let mut index = self.index.lock();
            let removed = index.remove_range_by_score(min, max);
            (removed, index.len())
        };
        self.purge(removed, remaining, "remove_by_score")
    }

    /// Removes every member with `score <= max`.
    pub fn remove_up_to_score(&self, max: i64) -> usize {
        self.remove_by_score(i64::MIN, max)
    }

    // == Remove By Rank ==
    /// Removes members whose 0-based ascending rank lies in `[start, stop)`.
    pub fn remove_by_rank(&self, start: usize, stop: usize) -> usize {
        if start >= stop {
            return 0;
        }
        let (removed, remaining) = {
            let mut index = self.index.lock();
            let removed =
                index.remove_range_by_rank(start.saturating_add(1), stop.saturating_add(1));
            (removed, index.len())
        };
        self.purge(removed, remaining, "remove_by_rank")
    }

    /// Drops bulk-removed members from the table and resyncs the counter.
    ///
    /// Runs after the index lock is released. A table entry whose version
    /// differs from the removed node's was rewritten after that node was
    /// queued (re-scored, or deleted and added again). Its own queued job
    /// will index it, so the table keeps it.
    fn purge(&self, removed: Vec<IndexEntry>, remaining: usize, op: &str) -> usize {
        for entry in &removed {
            self.dict
                .remove_if(&entry.member, |_, element| element.version == entry.version);
        }
        self.count.store(remaining as i64, Ordering::SeqCst);
        debug!(
            op,
            removed = removed.len(),
            count = remaining,
            map_len = self.dict.len(),
            "sorted set counter resynced"
        );
        removed.len()
    }
}

impl<V: Clone> SortedSet<V> {
    // == Get ==
    /// Point lookup against the table; never touches the index.
    pub fn get(&self, member: &str) -> Option<Element<V>> {
        self.dict.get(member).map(|element| element.value().clone())
    }

    // == Rank ==
    /// Returns the 0-based ascending rank of `member`, if indexed.
    pub fn rank(&self, member: &str) -> Option<usize> {
        let score = self.dict.get(member)?.score;
        self.index
            .lock()
            .rank(member, score)
            .map(|rank| rank - 1)
    }

    // == Range By Score ==
    /// Returns elements with `min <= score <= max` in score order.
    ///
    /// `limit = None` returns every match after `offset`.
    pub fn range_by_score(
        &self,
        min: i64,
        max: i64,
        offset: usize,
        limit: Option<usize>,
        descending: bool,
    ) -> Vec<Element<V>> {
        let hits = self
            .index
            .lock()
            .range_by_score(min, max, offset, limit, descending);
        self.resolve(hits)
    }

    // == Range By Rank ==
    /// Returns elements whose 0-based rank lies in `[start, stop)`.
    pub fn range_by_rank(&self, start: usize, stop: usize, descending: bool) -> Vec<Element<V>> {
        let hits = self.index.lock().range_by_rank(start, stop, descending);
        self.resolve(hits)
    }

    /// Looks index hits up in the table once the index lock is released.
    fn resolve(&self, hits: Vec<IndexEntry>) -> Vec<Element<V>> {
        hits.into_iter()
            .filter_map(|hit| self.get(&hit.member))
            .collect()
    }
}

/// Drains the mutation queue until every producer is gone.
fn run_index_worker(queue: Receiver<IndexJob>, index: Arc<Mutex<SkipList>>) {
    for job in queue {
        let mut guard = index.lock();
        if panic::catch_unwind(AssertUnwindSafe(|| job.apply(&mut guard))).is_err() {
            error!("index job panicked, continuing with next job");
        }
    }
    debug!("index worker stopped");
}
