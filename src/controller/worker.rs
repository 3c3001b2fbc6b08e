// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-item pipeline and worker loop.
//!
//! For each dequeued [`WorkItem`]:
//! 1. Skip items that are not release records
//! 2. Re-read the record from the cache; skip it if it is gone
//! 3. Drop created notifications that predate startup
//! 4. Decode the current release (failure is retryable)
//! 5. Resolve and decode the predecessor (failure means "no predecessor";
//!    a lookup refused by the open circuit is retried)
//! 6. Classify, optionally diff values, and hand the event to the sink
//!
//! # Retry Policy
//!
//! A failed item goes back through the queue's rate limiter while its
//! attempt number is below the ceiling. The attempt that reaches the
//! ceiling is the last: the item is forgotten and reported, and the worker
//! moves on. Success clears the item's retry history.

use super::types::{Disposition, ProcessOutcome, SkipReason};
use crate::cache::RecordCache;
use crate::classifier::{classify, is_suppressed};
use crate::codec;
use crate::config::WatcherConfig;
use crate::diff::config_diff;
use crate::error::{report_error, Result, WatchError};
use crate::event::{ReleaseEvent, WorkItem};
use crate::metrics;
use crate::queue::WorkQueue;
use crate::resolver::PredecessorResolver;
use crate::sink::EventSink;
use crate::store::{RecordStore, RELEASE_RECORD_TYPE};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a worker needs to turn a work item into a sink call.
pub struct Pipeline<S: RecordStore, K: EventSink> {
    cache: Arc<RecordCache>,
    queue: Arc<WorkQueue<WorkItem>>,
    resolver: PredecessorResolver<S>,
    sink: Arc<K>,
    started_at: DateTime<Utc>,
    config_diff_enabled: bool,
}

impl<S: RecordStore, K: EventSink> Pipeline<S, K> {
    pub fn new(
        store: Arc<S>,
        sink: Arc<K>,
        cache: Arc<RecordCache>,
        queue: Arc<WorkQueue<WorkItem>>,
        config: &WatcherConfig,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cache,
            queue,
            resolver: PredecessorResolver::new(store, config.lookup_timeout_duration()),
            sink,
            started_at,
            config_diff_enabled: config.config_diff_enabled,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn resolver(&self) -> &PredecessorResolver<S> {
        &self.resolver
    }

    /// Replace the predecessor resolver, e.g. to tune its circuit breaker.
    pub fn with_resolver(mut self, resolver: PredecessorResolver<S>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Take one item off the queue, process it, and settle its retry state.
    ///
    /// Blocks until an item is available. Returns
    /// [`ProcessOutcome::ShutDown`] once the queue is closed.
    pub async fn process_next_item(&self) -> ProcessOutcome {
        let Some(item) = self.queue.get().await else {
            return ProcessOutcome::ShutDown;
        };

        let start = Instant::now();
        let result = self.process_item(&item).await;
        metrics::record_pipeline_latency(start.elapsed());

        let outcome = match result {
            Ok(disposition) => {
                self.queue.forget(&item);
                metrics::record_item_outcome("done");
                ProcessOutcome::Done(disposition)
            }
            Err(e) => self.handle_error(&item, e),
        };

        self.queue.done(&item);
        outcome
    }

    /// The retry ceiling is the queue's backoff `max_attempts`.
    fn handle_error(&self, item: &WorkItem, err: WatchError) -> ProcessOutcome {
        let attempt = self.queue.num_requeues(item) + 1;
        let max_retries = self.queue.backoff().max_attempts.max(1);

        if err.is_retryable() && attempt < max_retries {
            warn!(
                key = %item.key,
                kind = %item.kind,
                attempt,
                max_retries,
                error = %err,
                "Processing failed, requeueing"
            );
            self.queue.add_rate_limited(item.clone());
            metrics::record_item_outcome("retrying");
            return ProcessOutcome::Retrying { attempt };
        }

        self.queue.forget(item);
        metrics::record_item_outcome("given_up");
        report_error(&item.to_string(), &err);
        ProcessOutcome::GivenUp { attempts: attempt }
    }

    /// Run the pipeline for one item without touching queue state.
    pub async fn process_item(&self, item: &WorkItem) -> Result<Disposition> {
        if item.record_type != RELEASE_RECORD_TYPE {
            metrics::record_skipped(SkipReason::NotRelease.as_str());
            return Ok(Disposition::Skipped(SkipReason::NotRelease));
        }

        let Some(stored) = self.cache.get(&item.key).await else {
            debug!(key = %item.key, kind = %item.kind, "Record no longer exists, nothing to do");
            metrics::record_skipped(SkipReason::Gone.as_str());
            return Ok(Disposition::Skipped(SkipReason::Gone));
        };

        if is_suppressed(item.kind, stored.created_at, self.started_at) {
            debug!(
                key = %item.key,
                created_at = %stored.created_at,
                started_at = %self.started_at,
                "Record predates startup, suppressing"
            );
            metrics::record_suppressed();
            return Ok(Disposition::Suppressed);
        }

        let current = codec::decode(&stored.payload).map_err(|source| {
            warn!(
                key = %item.key,
                fingerprint = %codec::payload_fingerprint(&stored.payload),
                error = %source,
                "Failed to decode release"
            );
            metrics::record_decode_failure(source.kind());
            WatchError::Decode {
                key: item.key.to_string(),
                source,
            }
        })?;

        let previous = self.resolver.resolve(&stored.key, current.revision).await?;
        let action = classify(&current, previous.as_ref());
        let diff = self
            .config_diff_enabled
            .then(|| config_diff(&current, previous.as_ref()));

        let event = ReleaseEvent {
            key: stored.key.clone(),
            kind: item.kind,
            action,
            current,
            previous,
            created_at: stored.created_at,
            modified_at: stored.modified_at(),
            config_diff: diff,
        };

        self.sink
            .on_event(&event)
            .await
            .map_err(|e| WatchError::sink(self.sink.name(), e))?;

        debug!(key = %item.key, kind = %item.kind, action = %action, "Event dispatched");
        metrics::record_action_dispatched(action.as_str());
        Ok(Disposition::Dispatched(action))
    }
}

/// Worker loop: process items until the queue shuts down.
pub(crate) async fn run_worker<S: RecordStore, K: EventSink>(
    pipeline: Arc<Pipeline<S, K>>,
    running: Arc<AtomicUsize>,
) {
    metrics::set_active_workers(running.fetch_add(1, Ordering::Relaxed) + 1);
    info!("Worker started");

    loop {
        if pipeline.process_next_item().await == ProcessOutcome::ShutDown {
            break;
        }
    }

    metrics::set_active_workers(running.fetch_sub(1, Ordering::Relaxed).saturating_sub(1));
    info!("Worker stopped");
}
