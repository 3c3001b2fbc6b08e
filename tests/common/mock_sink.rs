//! Recording event sink.
//!
//! Records every delivered event and startup inventory for assertions.
//! Can be told to fail the next N deliveries, or every delivery.

use release_watch::classifier::Action;
use release_watch::error::SinkError;
use release_watch::event::ReleaseEvent;
use release_watch::release::ReleaseRecord;
use release_watch::sink::{EventSink, SinkFuture};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Event sink that records all calls.
///
/// # Example
/// ```rust,ignore
/// let sink = Arc::new(RecordingSink::new());
/// sink.fail_next(2);
///
/// // Use in tests...
///
/// assert_eq!(sink.attempts(), 3);
/// assert_eq!(sink.events().await.len(), 1);
/// ```
pub struct RecordingSink {
    /// Successfully delivered events
    events: RwLock<Vec<ReleaseEvent>>,
    /// Startup inventories, one entry per call
    startups: RwLock<Vec<Vec<ReleaseRecord>>>,
    /// Every on_event() call, failed or not
    attempts: AtomicUsize,
    /// Remaining deliveries to fail
    fail_remaining: AtomicUsize,
    /// Fail every delivery
    always_fail: AtomicBool,
    /// Fail on_startup()
    fail_startup: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            startups: RwLock::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            always_fail: AtomicBool::new(false),
            fail_startup: AtomicBool::new(false),
        }
    }

    /// A sink whose every delivery fails.
    pub fn failing() -> Self {
        let sink = Self::new();
        sink.always_fail.store(true, Ordering::SeqCst);
        sink
    }

    /// Fail the next `n` deliveries, then succeed.
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_startup(&self) {
        self.fail_startup.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn events(&self) -> Vec<ReleaseEvent> {
        self.events.read().await.clone()
    }

    pub async fn actions(&self) -> Vec<Action> {
        self.events.read().await.iter().map(|e| e.action).collect()
    }

    pub async fn startups(&self) -> Vec<Vec<ReleaseRecord>> {
        self.startups.read().await.clone()
    }

    /// Poll until at least `n` events have been delivered.
    pub async fn wait_for_events(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.events.read().await.len() >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until at least `n` deliveries have been attempted.
    pub async fn wait_for_attempts(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.attempts() < n {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    fn should_fail(&self) -> bool {
        if self.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event<'a>(&'a self, event: &'a ReleaseEvent) -> SinkFuture<'a> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.should_fail() {
                return Err(SinkError("injected failure".to_string()));
            }
            self.events.write().await.push(event.clone());
            Ok(())
        })
    }

    fn on_startup<'a>(&'a self, releases: &'a [ReleaseRecord]) -> SinkFuture<'a> {
        Box::pin(async move {
            self.startups.write().await.push(releases.to_vec());
            if self.fail_startup.load(Ordering::SeqCst) {
                return Err(SinkError("injected startup failure".to_string()));
            }
            Ok(())
        })
    }
}
