// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Rate-limited, deduplicating work queue.
//!
//! # Item lifecycle
//!
//! ```text
//!   add()          get()              done()
//! ─────────► dirty ─────► processing ─────────► (gone)
//!              ▲              │
//!              │   add() while processing: parked in dirty,
//!              └──────────────┘ requeued by done()
//! ```
//!
//! - An item that is already waiting is not added twice.
//! - An item is never handed to two workers at once: re-adding it while it
//!   is being processed parks it until [`done`](WorkQueue::done).
//! - [`add_rate_limited`](WorkQueue::add_rate_limited) re-adds after the
//!   item's exponential backoff, then waits for a token from the shared
//!   bucket. Successive calls for the same item double its delay until
//!   [`forget`](WorkQueue::forget) resets it.
//! - After [`shut_down`](WorkQueue::shut_down), `get` returns `None`
//!   immediately and further adds are ignored.

use crate::metrics;
use crate::resilience::{RateLimitConfig, RateLimiter, RetryConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

struct QueueState<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    failures: HashMap<T, usize>,
    shutting_down: bool,
}

/// Work queue shared by the watch callbacks and the worker pool.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    backoff: RetryConfig,
    limiter: RateLimiter,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(backoff: RetryConfig, rate_limit: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff,
            limiter: RateLimiter::new(rate_limit),
        }
    }

    // A panicking worker must not wedge the queue for everyone else.
    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item unless an equal one is already waiting.
    pub fn add(&self, item: T) {
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(item.clone()) {
            trace!(?item, "Item already queued");
            return;
        }
        if state.processing.contains(&item) {
            trace!(?item, "Item in flight, parked until done");
            return;
        }
        state.queue.push_back(item);
        metrics::set_queue_depth(state.queue.len());
        drop(state);
        self.notify.notify_one();
    }

    /// Block until an item is available. `None` once the queue shuts down.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    metrics::set_queue_depth(state.queue.len());
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Mark an item finished. Requeues it if it was re-added meanwhile.
    pub fn done(&self, item: &T) {
        let mut state = self.state();
        state.processing.remove(item);
        if state.dirty.contains(item) && !state.shutting_down {
            state.queue.push_back(item.clone());
            metrics::set_queue_depth(state.queue.len());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Re-add `item` after its backoff delay and a rate-limit token.
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let delay = self.when(&item);
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.limiter.acquire().await;
            queue.add(item);
        });
    }

    /// Record a failure for `item` and return how long to wait before retrying.
    fn when(&self, item: &T) -> Duration {
        let mut state = self.state();
        let failures = state.failures.entry(item.clone()).or_insert(0);
        *failures += 1;
        self.backoff.delay_for_attempt(*failures)
    }

    /// Clear the failure history of `item`.
    pub fn forget(&self, item: &T) {
        self.state().failures.remove(item);
    }

    /// How many times `item` has been requeued through the rate limiter
    /// since it was last forgotten.
    pub fn num_requeues(&self, item: &T) -> usize {
        self.state().failures.get(item).copied().unwrap_or(0)
    }

    /// Number of items waiting (not counting in-flight ones).
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out items and wake every waiting worker.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Per-item schedule; `max_attempts` is the retry ceiling workers apply.
    pub fn backoff(&self) -> &RetryConfig {
        &self.backoff
    }
}
