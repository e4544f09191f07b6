//! # Work Queue
//!
//! Deduplicating, rate-limited FIFO of keys awaiting reconciliation.
//!
//! A key is held in at most one of three places:
//! - the FIFO (`queue`), waiting for a worker
//! - the processing set, while a worker syncs it
//! - the delay heap, waiting for its backoff to elapse
//!
//! Adding a key that is already queued is a no-op. Adding a key that is being
//! processed marks it dirty; it is queued again once the worker calls
//! [`WorkQueue::done`]. This keeps at most one sync per key in flight.

use crate::controller::backoff::RateLimiter;
use crate::observability::metrics;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{trace, warn};

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    /// Keys that need processing (queued, or re-added while processing)
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

/// A delayed key, ordered so the earliest `ready_at` sits on top of the max-heap
#[derive(Debug)]
struct WaitingKey<K> {
    ready_at: Instant,
    seq: u64,
    key: K,
}

impl<K> PartialEq for WaitingKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<K> Eq for WaitingKey<K> {}

impl<K> PartialOrd for WaitingKey<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for WaitingKey<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: earliest ready time first, FIFO among equal ready times
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
struct DelayState<K> {
    heap: BinaryHeap<WaitingKey<K>>,
    /// Current entry per key; heap entries not matching this are stale
    waiting: HashMap<K, (Instant, u64)>,
    next_seq: u64,
}

/// Rate-limited work queue shared by the event router and the worker pool
pub struct WorkQueue<K> {
    name: String,
    state: Mutex<QueueState<K>>,
    item_available: Notify,
    delay: Mutex<DelayState<K>>,
    delay_changed: Arc<Notify>,
    rate_limiter: Box<dyn RateLimiter<K>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    /// Create a queue and start its delay loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>, rate_limiter: Box<dyn RateLimiter<K>>) -> Arc<Self> {
        let delay_changed = Arc::new(Notify::new());
        let queue = Arc::new(Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            item_available: Notify::new(),
            delay: Mutex::new(DelayState {
                heap: BinaryHeap::new(),
                waiting: HashMap::new(),
                next_seq: 0,
            }),
            delay_changed: Arc::clone(&delay_changed),
            rate_limiter,
        });
        tokio::spawn(delay_loop(Arc::downgrade(&queue), delay_changed));
        queue
    }

    /// Queue `key` for processing
    ///
    /// No-op if the key is already queued or the queue is shutting down. A key
    /// that is currently processing is redelivered after [`done`](Self::done).
    pub fn add(&self, key: K) {
        let mut state = lock(&self.state);
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        metrics::increment_queue_adds(&self.name);
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            trace!(queue = %self.name, key = ?key, "Key is processing, deferring re-add");
            return;
        }
        state.queue.push_back(key);
        metrics::set_queue_depth(&self.name, state.queue.len());
        drop(state);
        self.item_available.notify_one();
    }

    /// Wait for the next key, or `None` once the queue is shut down
    ///
    /// The returned key is marked as processing until [`done`](Self::done) is called.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.item_available.notified();
            tokio::pin!(notified);
            // Register before inspecting the state so a shutdown or add in between is not missed
            notified.as_mut().enable();
            {
                let mut state = lock(&self.state);
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    metrics::set_queue_depth(&self.name, state.queue.len());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Mark `key` as no longer processing
    ///
    /// If the key was added again while it was processing it is queued right away.
    pub fn done(&self, key: &K) {
        let mut state = lock(&self.state);
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            metrics::set_queue_depth(&self.name, state.queue.len());
            drop(state);
            self.item_available.notify_one();
        }
    }

    /// Add `key` once `delay` has elapsed
    ///
    /// A key already waiting keeps whichever ready time is earlier.
    pub fn add_after(&self, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let Some(ready_at) = Instant::now().checked_add(delay) else {
            warn!(
                queue = %self.name,
                key = ?key,
                delay_ms = delay.as_millis(),
                "Delay out of range, key not scheduled"
            );
            return;
        };
        let mut delayed = lock(&self.delay);
        if let Some((existing, _)) = delayed.waiting.get(&key) {
            if *existing <= ready_at {
                return;
            }
        }
        let seq = delayed.next_seq;
        delayed.next_seq += 1;
        delayed.waiting.insert(key.clone(), (ready_at, seq));
        delayed.heap.push(WaitingKey { ready_at, seq, key });
        drop(delayed);
        self.delay_changed.notify_one();
    }

    /// Add `key` after the rate limiter says it may be retried
    ///
    /// Returns the delay the key was scheduled with.
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let delay = self.rate_limiter.when(&key);
        trace!(queue = %self.name, key = ?key, delay_ms = delay.as_millis(), "Rate limited add");
        self.add_after(key, delay);
        delay
    }

    /// Clear the rate limiter's failure history for `key`
    pub fn forget(&self, key: &K) {
        self.rate_limiter.forget(key);
    }

    /// How many times `key` has been requeued through the rate limiter
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.rate_limiter.num_requeues(key)
    }

    /// Stop delivering keys and wake every waiting worker
    ///
    /// Idempotent. Keys still queued are not delivered.
    pub fn shut_down(&self) {
        {
            let mut state = lock(&self.state);
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
        }
        self.item_available.notify_waiters();
        self.delay_changed.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        lock(&self.state).shutting_down
    }

    /// Number of keys waiting for a worker (excludes processing and delayed keys)
    pub fn len(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move every delayed key whose time has come into the FIFO
    ///
    /// Returns when the next delayed key becomes ready.
    fn release_ready(&self, now: Instant) -> Option<Instant> {
        let mut ready = Vec::new();
        let next = {
            let mut delayed = lock(&self.delay);
            while delayed.heap.peek().is_some_and(|top| top.ready_at <= now) {
                let Some(entry) = delayed.heap.pop() else {
                    break;
                };
                if delayed.waiting.get(&entry.key) == Some(&(entry.ready_at, entry.seq)) {
                    delayed.waiting.remove(&entry.key);
                    ready.push(entry.key);
                }
            }
            delayed.heap.peek().map(|top| top.ready_at)
        };
        for key in ready {
            self.add(key);
        }
        next
    }
}

impl<K> fmt::Debug for WorkQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("queued", &state.queue.len())
            .field("processing", &state.processing.len())
            .field("shutting_down", &state.shutting_down)
            .finish_non_exhaustive()
    }
}

impl<K> Drop for WorkQueue<K> {
    fn drop(&mut self) {
        // Lets the delay loop notice the queue is gone
        self.delay_changed.notify_waiters();
    }
}

/// Merges delayed keys back into the FIFO as their ready time passes
async fn delay_loop<K>(queue: Weak<WorkQueue<K>>, delay_changed: Arc<Notify>)
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    loop {
        let notified = delay_changed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let next_ready = {
            let Some(queue) = queue.upgrade() else {
                return;
            };
            if queue.is_shutting_down() {
                return;
            }
            queue.release_ready(Instant::now())
        };

        match next_ready {
            Some(deadline) => {
                tokio::select! {
                    () = &mut notified => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => notified.await,
        }
    }
}
