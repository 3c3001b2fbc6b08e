// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Release watch controller.
//!
//! The orchestrator that ties together:
//! - The reflector keeping [`crate::cache::RecordCache`] in step with the store
//! - The reconciliation queue ([`crate::queue::WorkQueue`])
//! - A pool of workers running the per-item [`Pipeline`]
//! - The configured [`EventSink`]
//!
//! # Lifecycle
//!
//! 1. Starts the reflector (watch, then list)
//! 2. Waits for the first listing, bounded by the cache sync timeout
//! 3. Reports the active releases to the sink
//! 4. Spawns the workers
//! 5. On shutdown, closes the queue and joins every task

mod types;
mod worker;

pub use types::{ControllerState, Disposition, ProcessOutcome, SkipReason};
pub use worker::Pipeline;

use crate::cache::{RecordCache, Reflector};
use crate::codec;
use crate::config::WatcherConfig;
use crate::error::{Result, WatchError};
use crate::event::WorkItem;
use crate::metrics;
use crate::queue::WorkQueue;
use crate::release::{ReleaseRecord, Status};
use crate::resilience::RetryConfig;
use crate::sink::{EventSink, LogSink};
use crate::store::{MemoryStore, RecordStore, StoredRecord};
use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// The release watcher.
///
/// Owns the cache, the queue and every background task. Generic over the
/// record store it watches and the sink it reports to.
pub struct Controller<S: RecordStore = MemoryStore, K: EventSink = LogSink> {
    config: WatcherConfig,

    /// Controller state (broadcast to watchers)
    state_tx: watch::Sender<ControllerState>,
    state_rx: watch::Receiver<ControllerState>,

    store: Arc<S>,
    sink: Arc<K>,
    cache: Arc<RecordCache>,
    queue: Arc<WorkQueue<WorkItem>>,

    /// Created notifications for records older than this are suppressed.
    started_at: DateTime<Utc>,

    relist: RetryConfig,
    pipeline: Option<Arc<Pipeline<S, K>>>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    active_workers: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
}

impl Controller<MemoryStore, LogSink> {
    /// Controller over an in-process store that logs every event.
    pub fn in_memory(config: WatcherConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(LogSink::new()))
    }
}

impl<S: RecordStore, K: EventSink> Controller<S, K> {
    /// Create a controller. The start time is taken now.
    ///
    /// The controller starts in `Created` state. Call [`start()`](Self::start)
    /// to sync the cache and begin processing.
    pub fn new(config: WatcherConfig, store: Arc<S>, sink: Arc<K>) -> Self {
        let (state_tx, state_rx) = watch::channel(ControllerState::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue = Arc::new(WorkQueue::new(
            config.queue.retry_config(),
            config.queue.rate_limit_config(),
        ));

        Self {
            config,
            state_tx,
            state_rx,
            store,
            sink,
            cache: Arc::new(RecordCache::new()),
            queue,
            started_at: Utc::now(),
            relist: RetryConfig::relist(),
            pipeline: None,
            shutdown_tx,
            shutdown_rx,
            active_workers: Arc::new(AtomicUsize::new(0)),
            handles: Vec::new(),
        }
    }

    /// Override the start time used for suppression.
    pub fn with_start_time(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Override the backoff between re-lists after a watch failure.
    pub fn with_relist(mut self, relist: RetryConfig) -> Self {
        self.relist = relist;
        self
    }

    pub fn state(&self) -> ControllerState {
        *self.state_rx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ControllerState> {
        self.state_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), ControllerState::Running)
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<K> {
        &self.sink
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<WorkQueue<WorkItem>> {
        &self.queue
    }

    /// The worker pipeline. `None` until [`start()`](Self::start) runs.
    pub fn pipeline(&self) -> Option<&Arc<Pipeline<S, K>>> {
        self.pipeline.as_ref()
    }

    fn set_state(&self, state: ControllerState) {
        let _ = self.state_tx.send(state);
        metrics::set_controller_state(&state.to_string());
    }

    /// Start watching.
    ///
    /// Returns once the cache has synced and the workers are running.
    /// Fails with [`WatchError::SyncTimeout`] if the first listing does not
    /// land in time; the controller is then `Failed` and every task it
    /// started has been stopped.
    pub async fn start(&mut self) -> Result<()> {
        if self.state() != ControllerState::Created {
            return Err(WatchError::InvalidState {
                expected: "Created".to_string(),
                actual: format!("{:?}", self.state()),
            });
        }
        self.config.validate()?;

        info!(
            namespace = %self.config.namespace,
            cluster_wide = self.config.is_cluster_wide(),
            workers = self.config.workers,
            config_diff = self.config.config_diff_enabled,
            started_at = %self.started_at,
            "Starting release watcher"
        );
        self.set_state(ControllerState::Syncing);

        self.spawn_reflector();

        let timeout = self.config.cache_sync_timeout_duration();
        if !self.cache.wait_for_sync(timeout).await {
            error!(timeout_ms = timeout.as_millis() as u64, "Timed out waiting for local cache to sync");
            self.abort_tasks();
            self.set_state(ControllerState::Failed);
            return Err(WatchError::SyncTimeout { timeout });
        }

        self.report_startup_inventory().await;

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            Arc::clone(&self.cache),
            Arc::clone(&self.queue),
            &self.config,
            self.started_at,
        ));
        self.pipeline = Some(Arc::clone(&pipeline));
        self.spawn_workers(pipeline);

        self.set_state(ControllerState::Running);
        info!(
            workers = self.config.workers,
            cached = self.cache.len().await,
            "Release watcher running"
        );
        Ok(())
    }

    fn spawn_reflector(&mut self) {
        let reflector = Reflector::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            Arc::clone(&self.queue),
            self.config.namespace.clone(),
        )
        .with_relist(self.relist.clone());
        let shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(
            reflector
                .run(shutdown_rx)
                .instrument(info_span!("reflector")),
        );
        debug!("Spawned reflector");
        self.handles.push(handle);
    }

    fn spawn_workers(&mut self, pipeline: Arc<Pipeline<S, K>>) {
        for id in 0..self.config.workers {
            let pipeline = Arc::clone(&pipeline);
            let active = Arc::clone(&self.active_workers);
            let handle = tokio::spawn(
                worker::run_worker(pipeline, active).instrument(info_span!("worker", id)),
            );
            self.handles.push(handle);
        }
        info!(count = self.config.workers, "Spawned workers");
    }

    /// Hand the active releases to the sink. A failure is logged, not fatal.
    async fn report_startup_inventory(&self) {
        let releases = active_releases(&self.cache.snapshot().await);
        info!(count = releases.len(), "Reporting active releases");
        if let Err(e) = self.sink.on_startup(&releases).await {
            warn!(sink = self.sink.name(), error = %e, "Failed to report active releases");
        }
    }

    /// Stop everything after a failed start.
    fn abort_tasks(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.queue.shut_down();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    /// Shut down gracefully.
    ///
    /// 1. Signal the reflector and close the queue
    /// 2. Wait for each task, bounded by the drain timeout; workers finish
    ///    their in-flight item and exit without draining the queue
    pub async fn shutdown(&mut self) {
        if matches!(self.state(), ControllerState::Stopped) {
            return;
        }
        info!("Shutting down release watcher");
        self.set_state(ControllerState::ShuttingDown);

        let _ = self.shutdown_tx.send(true);
        self.queue.shut_down();

        let handles = std::mem::take(&mut self.handles);
        let task_count = handles.len();
        if task_count > 0 {
            info!(task_count, "Waiting for tasks to complete");
        }

        let drain_timeout = self.config.shutdown_drain_timeout_duration();
        for (i, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(drain_timeout, handle).await {
                Ok(Ok(())) => {
                    debug!(task = i + 1, "Task completed gracefully");
                }
                Ok(Err(e)) => {
                    warn!(task = i + 1, error = %e, "Task panicked during shutdown");
                }
                Err(_) => {
                    warn!(task = i + 1, "Task timed out during shutdown (in-flight item may be redelivered)");
                }
            }
        }

        metrics::set_active_workers(0);
        self.set_state(ControllerState::Stopped);
        info!("Release watcher stopped");
    }
}

/// Releases to report at startup: decodable release records that are not
/// superseded, in key order.
pub fn active_releases(records: &[StoredRecord]) -> Vec<ReleaseRecord> {
    records
        .iter()
        .filter(|r| r.is_release())
        .filter_map(|r| match codec::decode(&r.payload) {
            Ok(release) => Some(release),
            Err(e) => {
                warn!(key = %r.key, error = %e, "Skipping undecodable release in startup inventory");
                None
            }
        })
        .filter(|release| release.status() != Status::Superseded)
        .collect()
}
