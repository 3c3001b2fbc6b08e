// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local record cache and the reflector that keeps it current.
//!
//! # Architecture
//!
//! ```text
//! RecordStore ──watch──┐
//!             ──list───┤
//!                      ▼
//!                 Reflector ──apply/replace──► RecordCache ◄──get── workers
//!                      │
//!                      └──WorkItem──► WorkQueue
//! ```
//!
//! One reflector task is the only writer. It opens the watch before listing
//! so no change falls between the two, diffs the listing against the cache,
//! and turns every change into a [`WorkItem`]. The first completed listing
//! marks the cache synced. A failed or closed watch triggers a re-list with
//! backoff; the diff makes re-lists emit only what actually changed.

use crate::error::{Result, WatchError};
use crate::event::{EventKind, WorkItem};
use crate::metrics;
use crate::queue::WorkQueue;
use crate::resilience::RetryConfig;
use crate::store::{RecordKey, RecordStore, StoredRecord, WatchEvent};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Records indexed by key, shared between the reflector and the workers.
pub struct RecordCache {
    records: RwLock<HashMap<RecordKey, StoredRecord>>,
    synced_tx: watch::Sender<bool>,
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCache {
    pub fn new() -> Self {
        let (synced_tx, _) = watch::channel(false);
        Self {
            records: RwLock::new(HashMap::new()),
            synced_tx,
        }
    }

    /// Authoritative current state of `key`, if it still exists.
    pub async fn get(&self, key: &RecordKey) -> Option<StoredRecord> {
        self.records.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Every cached record, ordered by key.
    pub async fn snapshot(&self) -> Vec<StoredRecord> {
        let mut records: Vec<StoredRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    pub fn has_synced(&self) -> bool {
        *self.synced_tx.borrow()
    }

    /// Wait until the first listing has landed. `false` on timeout.
    pub async fn wait_for_sync(&self, timeout: Duration) -> bool {
        let mut rx = self.synced_tx.subscribe();
        let synced = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|synced| *synced)).await,
            Ok(Ok(_))
        );
        synced
    }

    pub fn mark_synced(&self) {
        self.synced_tx.send_replace(true);
    }

    /// Replace the cache contents with a fresh listing.
    ///
    /// Returns one work item per difference: new keys as created, changed
    /// resource versions as updated, vanished keys as deleted.
    pub async fn replace(&self, listed: Vec<StoredRecord>) -> Vec<WorkItem> {
        let mut records = self.records.write().await;
        let mut items = Vec::new();
        let mut seen = HashSet::with_capacity(listed.len());

        for record in listed {
            seen.insert(record.key.clone());
            let kind = match records.get(&record.key) {
                None => Some(EventKind::Created),
                Some(old) if old.resource_version != record.resource_version => Some(EventKind::Updated),
                Some(_) => None,
            };
            if let Some(kind) = kind {
                items.push(WorkItem::new(record.key.clone(), kind, record.record_type.clone()));
                records.insert(record.key.clone(), record);
            }
        }

        let vanished: Vec<RecordKey> = records.keys().filter(|k| !seen.contains(*k)).cloned().collect();
        for key in vanished {
            if let Some(old) = records.remove(&key) {
                items.push(WorkItem::new(key, EventKind::Deleted, old.record_type));
            }
        }

        metrics::set_cache_size(records.len());
        items
    }

    /// Apply one watch notification.
    ///
    /// Returns `None` for notifications the cache has already seen, such as
    /// an add that the overlapping listing already delivered, and for
    /// notifications older than the cached record. The watch is opened before
    /// the listing, so it can still hold changes the listing superseded.
    pub async fn apply(&self, event: WatchEvent) -> Option<WorkItem> {
        let mut records = self.records.write().await;
        let item = match event {
            WatchEvent::Added(record) | WatchEvent::Modified(record) => {
                let kind = match records.get(&record.key) {
                    None => EventKind::Created,
                    Some(old) if old.resource_version == record.resource_version => return None,
                    Some(old) if is_older(&record.resource_version, &old.resource_version) => {
                        debug!(key = %record.key, version = %record.resource_version, "Ignoring stale notification");
                        return None;
                    }
                    Some(_) => EventKind::Updated,
                };
                let item = WorkItem::new(record.key.clone(), kind, record.record_type.clone());
                records.insert(record.key.clone(), record);
                item
            }
            WatchEvent::Deleted(record) => {
                if let Some(old) = records.get(&record.key) {
                    if is_older(&record.resource_version, &old.resource_version) {
                        debug!(key = %record.key, version = %record.resource_version, "Ignoring stale delete");
                        return None;
                    }
                }
                records.remove(&record.key);
                WorkItem::new(record.key, EventKind::Deleted, record.record_type)
            }
        };
        metrics::set_cache_size(records.len());
        Some(item)
    }
}

/// `true` when both versions are numeric and `candidate` precedes `current`.
///
/// Versions that do not parse are opaque and never compare as older.
fn is_older(candidate: &str, current: &str) -> bool {
    match (candidate.parse::<u64>(), current.parse::<u64>()) {
        (Ok(candidate), Ok(current)) => candidate < current,
        _ => false,
    }
}

/// Why one list-and-watch pass ended.
enum WatchEnd {
    Shutdown,
    Closed,
}

/// Keeps a [`RecordCache`] in step with a [`RecordStore`] and feeds the queue.
pub struct Reflector<S: RecordStore> {
    store: Arc<S>,
    cache: Arc<RecordCache>,
    queue: Arc<WorkQueue<WorkItem>>,
    namespace: String,
    relist: RetryConfig,
}

impl<S: RecordStore> Reflector<S> {
    pub fn new(
        store: Arc<S>,
        cache: Arc<RecordCache>,
        queue: Arc<WorkQueue<WorkItem>>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            namespace: namespace.into(),
            relist: RetryConfig::relist(),
        }
    }

    pub fn with_relist(mut self, relist: RetryConfig) -> Self {
        self.relist = relist;
        self
    }

    /// Run until `shutdown_rx` turns true or its sender is dropped.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(namespace = %self.namespace, "Reflector starting");
        let mut failures = 0usize;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let reason = match self.list_and_watch(&mut shutdown_rx).await {
                Ok(WatchEnd::Shutdown) => break,
                Ok(WatchEnd::Closed) => {
                    failures = 0;
                    debug!("Watch stream closed, re-listing");
                    "closed"
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, attempt = failures, "Watch failed, re-listing");
                    "error"
                }
            };
            metrics::record_watch_restart(reason);

            let delay = self.relist.delay_for_attempt(failures.max(1));
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reflector stopped");
    }

    async fn list_and_watch(&self, shutdown_rx: &mut watch::Receiver<bool>) -> Result<WatchEnd> {
        let start = Instant::now();
        let mut events = self
            .store
            .watch(&self.namespace)
            .await
            .map_err(|e| WatchError::store("watch", e))?;
        let listed = self
            .store
            .list(&self.namespace)
            .await
            .map_err(|e| WatchError::store("list", e))?;

        let count = listed.len();
        for item in self.cache.replace(listed).await {
            self.enqueue(item);
        }
        metrics::record_cache_sync(start.elapsed(), count);

        if !self.cache.has_synced() {
            info!(records = count, elapsed_ms = start.elapsed().as_millis() as u64, "Local cache synced");
            self.cache.mark_synced();
        }

        loop {
            tokio::select! {
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        if let Some(item) = self.cache.apply(event).await {
                            self.enqueue(item);
                        }
                    }
                    Some(Err(e)) => return Err(WatchError::store("watch", e)),
                    None => return Ok(WatchEnd::Closed),
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return Ok(WatchEnd::Shutdown);
                    }
                }
            }
        }
    }

    fn enqueue(&self, item: WorkItem) {
        debug!(key = %item.key, kind = %item.kind, "Enqueue");
        metrics::record_work_item_enqueued(item.kind.as_str());
        self.queue.add(item);
    }
}
