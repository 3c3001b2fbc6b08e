// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record store interface.
//!
//! The watcher consumes the cluster's secret collection through
//! [`RecordStore`]: a listing, a change stream, and point lookups. The
//! cluster client that implements it is wired in by the binary; this crate
//! ships [`MemoryStore`] for standalone runs and tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use release_watch::store::{BoxFuture, RecordKey, RecordStore, StoredRecord, WatchStream};
//!
//! struct ClusterSecrets { /* API client */ }
//!
//! impl RecordStore for ClusterSecrets {
//!     fn list(&self, _namespace: &str) -> BoxFuture<'_, Vec<StoredRecord>> {
//!         Box::pin(async move { Ok(vec![]) })
//!     }
//!
//!     fn watch(&self, _namespace: &str) -> BoxFuture<'_, WatchStream> {
//!         Box::pin(async move { Ok(Box::pin(futures::stream::empty()) as WatchStream) })
//!     }
//!
//!     fn get(&self, _key: &RecordKey) -> BoxFuture<'_, Option<StoredRecord>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//! }
//! ```

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};

/// Resource type of secrets that hold Helm releases.
pub const RELEASE_RECORD_TYPE: &str = "helm.sh/release.v1";

/// Label Helm stamps with the unix time of the last write.
pub const MODIFIED_AT_LABEL: &str = "modifiedAt";

/// Result type for record store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Change notifications from [`RecordStore::watch`].
pub type WatchStream = BoxStream<'static, StoreResult<WatchEvent>>;

/// Identity of a stored record: namespace plus object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub namespace: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace/name`, or a bare `name` for cluster-scoped keys.
    pub fn parse(key: &str) -> Self {
        match key.split_once('/') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new("", key),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// A raw stored object as the store returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: RecordKey,

    /// Secret type, [`RELEASE_RECORD_TYPE`] for releases.
    pub record_type: String,

    pub created_at: DateTime<Utc>,

    /// Opaque version that changes on every write.
    pub resource_version: String,

    pub labels: BTreeMap<String, String>,

    /// The base64 release blob.
    pub payload: Vec<u8>,
}

impl StoredRecord {
    pub fn is_release(&self) -> bool {
        self.record_type == RELEASE_RECORD_TYPE
    }

    /// Time of the last write according to the `modifiedAt` label.
    ///
    /// Missing or unparsable labels yield `None`; older clients never set it.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.labels.get(MODIFIED_AT_LABEL)?;
        let secs = raw.parse::<i64>().ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}

/// One change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(StoredRecord),
    Modified(StoredRecord),
    Deleted(StoredRecord),
}

impl WatchEvent {
    pub fn record(&self) -> &StoredRecord {
        match self {
            Self::Added(r) | Self::Modified(r) | Self::Deleted(r) => r,
        }
    }
}

/// What the watcher needs from the cluster.
///
/// An empty namespace means all namespaces.
pub trait RecordStore: Send + Sync + 'static {
    /// List every record visible in `namespace`.
    fn list(&self, namespace: &str) -> BoxFuture<'_, Vec<StoredRecord>>;

    /// Open a change stream for `namespace`.
    ///
    /// The stream ending, or yielding an error, tells the caller to re-list.
    fn watch(&self, namespace: &str) -> BoxFuture<'_, WatchStream>;

    /// Point lookup. `Ok(None)` when the record does not exist.
    fn get(&self, key: &RecordKey) -> BoxFuture<'_, Option<StoredRecord>>;
}

fn in_namespace(scope: &str, key: &RecordKey) -> bool {
    scope.is_empty() || scope == key.namespace
}

/// In-process [`RecordStore`].
///
/// Writes through [`put`](Self::put) and [`remove`](Self::remove) are
/// broadcast to every open watch. Resource versions come from a single
/// counter, so every write yields a new one.
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, StoredRecord>>,
    events: broadcast::Sender<WatchEvent>,
    next_version: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// `capacity` bounds how far a watcher may fall behind before it sees
    /// [`StoreError::WatchLagged`].
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            records: RwLock::new(HashMap::new()),
            events,
            next_version: AtomicU64::new(1),
        }
    }

    /// Insert or replace a record, stamping a fresh resource version.
    ///
    /// Returns the record as stored.
    pub async fn put(&self, mut record: StoredRecord) -> StoredRecord {
        record.resource_version = self.next_version.fetch_add(1, Ordering::Relaxed).to_string();
        let previous = self
            .records
            .write()
            .await
            .insert(record.key.clone(), record.clone());
        let event = if previous.is_some() {
            WatchEvent::Modified(record.clone())
        } else {
            WatchEvent::Added(record.clone())
        };
        // No receivers is fine; nobody is watching yet.
        let _ = self.events.send(event);
        record
    }

    /// Delete a record. Returns the removed record, if any.
    pub async fn remove(&self, key: &RecordKey) -> Option<StoredRecord> {
        let removed = self.records.write().await.remove(key);
        if let Some(ref record) = removed {
            let _ = self.events.send(WatchEvent::Deleted(record.clone()));
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn list(&self, namespace: &str) -> BoxFuture<'_, Vec<StoredRecord>> {
        let namespace = namespace.to_string();
        Box::pin(async move {
            let records = self.records.read().await;
            let mut listed: Vec<StoredRecord> = records
                .values()
                .filter(|r| in_namespace(&namespace, &r.key))
                .cloned()
                .collect();
            listed.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(listed)
        })
    }

    fn watch(&self, namespace: &str) -> BoxFuture<'_, WatchStream> {
        let namespace = namespace.to_string();
        let rx = self.events.subscribe();
        Box::pin(async move {
            let stream = futures::stream::unfold(rx, move |mut rx| {
                let namespace = namespace.clone();
                async move {
                    loop {
                        match rx.recv().await {
                            Ok(event) if in_namespace(&namespace, &event.record().key) => {
                                return Some((Ok(event), rx));
                            }
                            Ok(_) => continue,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                return Some((Err(StoreError::WatchLagged(n)), rx));
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        }
                    }
                }
            });
            Ok(Box::pin(stream) as WatchStream)
        })
    }

    fn get(&self, key: &RecordKey) -> BoxFuture<'_, Option<StoredRecord>> {
        let key = key.clone();
        Box::pin(async move { Ok(self.records.read().await.get(&key).cloned()) })
    }
}
