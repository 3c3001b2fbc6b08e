// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Predecessor lookup.
//!
//! Release secrets are named `sh.helm.release.v1.<release>.v<N>`. The
//! previous revision of a release lives in the same namespace under the same
//! name with `v<N-1>`, so the predecessor is found by name arithmetic plus a
//! point lookup.
//!
//! A lookup that runs and fails yields `None`: a release without a decodable
//! predecessor is classified as a fresh install instead of failing the item.
//! A lookup the circuit breaker refuses never reached the store, so it is
//! returned as a retryable error and the item goes back on the queue.

use crate::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::codec;
use crate::error::{Result, StoreError, WatchError};
use crate::metrics;
use crate::release::ReleaseRecord;
use crate::store::{RecordKey, RecordStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Parse the trailing `.v<N>` of a record name.
pub fn revision_suffix(name: &str) -> Option<u64> {
    let last = name.rsplit('.').next()?;
    last.strip_prefix('v')?.parse().ok()
}

/// Key of the revision before `key`, or `None` when `key` is revision 1 or
/// does not end in `.v<N>`.
pub fn previous_key(key: &RecordKey) -> Option<RecordKey> {
    let revision = revision_suffix(&key.name)?;
    if revision <= 1 {
        return None;
    }
    let (stem, _) = key.name.rsplit_once('.')?;
    Some(RecordKey::new(
        key.namespace.clone(),
        format!("{}.v{}", stem, revision - 1),
    ))
}

/// Fetches and decodes the predecessor of a release.
///
/// Lookups go through a circuit breaker so that an unhealthy store fails
/// fast instead of every worker waiting out the lookup timeout.
///
/// | Lookup result | `resolve` returns |
/// |---------------|-------------------|
/// | found, decodes | `Ok(Some(previous))` |
/// | not found, error, timeout, wrong type, undecodable | `Ok(None)` |
/// | rejected by the open circuit | `Err(WatchError::Store)` (retryable) |
pub struct PredecessorResolver<S: RecordStore> {
    store: Arc<S>,
    lookup_timeout: Duration,
    circuit: CircuitBreaker,
}

impl<S: RecordStore> PredecessorResolver<S> {
    pub fn new(store: Arc<S>, lookup_timeout: Duration) -> Self {
        Self::with_circuit(store, lookup_timeout, CircuitConfig::default())
    }

    pub fn with_circuit(store: Arc<S>, lookup_timeout: Duration, circuit: CircuitConfig) -> Self {
        Self {
            store,
            lookup_timeout,
            circuit: CircuitBreaker::new("predecessor_lookup", circuit),
        }
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    /// Resolve the release that `current_key` (at `current_revision`) replaced.
    ///
    /// Revision 1 short-circuits without touching the store.
    pub async fn resolve(&self, current_key: &RecordKey, current_revision: u64) -> Result<Option<ReleaseRecord>> {
        if current_revision <= 1 {
            return Ok(None);
        }

        let Some(prev_key) = previous_key(current_key) else {
            debug!(key = %current_key, "Record name has no revision suffix, skipping predecessor lookup");
            metrics::record_predecessor_lookup("malformed_key");
            return Ok(None);
        };

        if revision_suffix(&current_key.name) != Some(current_revision) {
            debug!(
                key = %current_key,
                revision = current_revision,
                "Record name suffix disagrees with release revision"
            );
        }

        let timeout = self.lookup_timeout;
        let result = self
            .circuit
            .call(|| async {
                tokio::time::timeout(timeout, self.store.get(&prev_key))
                    .await
                    .map_err(|_| StoreError::Timeout(timeout))?
            })
            .await;

        let stored = match result {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!(key = %prev_key, "Predecessor not found");
                metrics::record_predecessor_lookup("not_found");
                return Ok(None);
            }
            Err(CircuitError::Rejected) => {
                metrics::record_predecessor_lookup("rejected");
                return Err(WatchError::store(
                    "predecessor_lookup",
                    StoreError::Unavailable(format!("circuit {} open", self.circuit.name())),
                ));
            }
            Err(CircuitError::Inner(e)) => {
                warn!(key = %prev_key, error = %e, "Predecessor lookup failed");
                metrics::record_predecessor_lookup("error");
                return Ok(None);
            }
        };

        if !stored.is_release() {
            debug!(key = %prev_key, record_type = %stored.record_type, "Predecessor is not a release record");
            metrics::record_predecessor_lookup("not_release");
            return Ok(None);
        }

        match codec::decode(&stored.payload) {
            Ok(previous) => {
                metrics::record_predecessor_lookup("found");
                Ok(Some(previous))
            }
            Err(e) => {
                warn!(
                    key = %prev_key,
                    fingerprint = %codec::payload_fingerprint(&stored.payload),
                    error = %e,
                    "Failed to decode predecessor release"
                );
                metrics::record_decode_failure(e.kind());
                metrics::record_predecessor_lookup("decode_failed");
                Ok(None)
            }
        }
    }
}
