//! Record store wrapper with failure injection.
//!
//! Delegates to a [`MemoryStore`] but can fail listings, fail or stall point
//! lookups, or never answer a listing at all.

use release_watch::error::StoreError;
use release_watch::store::{BoxFuture, MemoryStore, RecordKey, RecordStore, StoredRecord, WatchStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    /// Remaining list() calls to fail
    list_failures: AtomicUsize,
    /// list() never completes
    hang_list: AtomicBool,
    /// get() fails
    fail_get: AtomicBool,
    /// get() sleeps this long (ms) before answering
    get_delay_ms: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            list_failures: AtomicUsize::new(0),
            hang_list: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            get_delay_ms: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// A store whose listing never completes.
    pub fn never_syncing(inner: Arc<MemoryStore>) -> Self {
        let store = Self::new(inner);
        store.hang_list.store(true, Ordering::SeqCst);
        store
    }

    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    pub fn fail_next_lists(&self, n: usize) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn delay_gets(&self, delay: Duration) {
        self.get_delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl RecordStore for FlakyStore {
    fn list(&self, namespace: &str) -> BoxFuture<'_, Vec<StoredRecord>> {
        let namespace = namespace.to_string();
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_list.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let fail = self
                .list_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(StoreError::Unavailable("injected list failure".to_string()));
            }
            self.inner.list(&namespace).await
        })
    }

    fn watch(&self, namespace: &str) -> BoxFuture<'_, WatchStream> {
        self.inner.watch(namespace)
    }

    fn get(&self, key: &RecordKey) -> BoxFuture<'_, Option<StoredRecord>> {
        let key = key.clone();
        Box::pin(async move {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.get_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected get failure".to_string()));
            }
            self.inner.get(&key).await
        })
    }
}
