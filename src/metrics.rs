//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Queue depth and per-item outcomes
//! - Dispatched actions, suppressed and skipped items
//! - Decode failures and predecessor lookups
//! - Cache sync and watch restarts
//! - Controller state and circuit breaker calls
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `release_watch_` and follow Prometheus
//! conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! Without an installed recorder every call is a no-op.
//!
//! # Usage
//!
//! ```rust,no_run
//! use release_watch::metrics;
//! use std::time::Duration;
//!
//! metrics::record_item_outcome("done");
//! metrics::record_pipeline_latency(Duration::from_millis(12));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Queue Metrics
// =============================================================================

/// Record a work item produced by a watch callback.
pub fn record_work_item_enqueued(kind: &str) {
    counter!("release_watch_items_enqueued_total", "kind" => kind.to_string()).increment(1);
}

/// Items waiting in the queue.
pub fn set_queue_depth(depth: usize) {
    gauge!("release_watch_queue_depth").set(depth as f64);
}

/// Final or intermediate outcome of processing one item
/// (`done`, `retrying`, `given_up`).
pub fn record_item_outcome(outcome: &str) {
    counter!("release_watch_item_outcomes_total", "outcome" => outcome.to_string()).increment(1);
}

/// Time spent in the pipeline for one item, including sink dispatch.
pub fn record_pipeline_latency(duration: Duration) {
    histogram!("release_watch_pipeline_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Record an event handed to the sink.
pub fn record_action_dispatched(action: &str) {
    counter!("release_watch_actions_dispatched_total", "action" => action.to_string()).increment(1);
}

/// Record a created notification that replayed pre-start history.
pub fn record_suppressed() {
    counter!("release_watch_suppressed_total").increment(1);
}

/// Record an item that completed without dispatch (`gone`, `not_release`).
pub fn record_skipped(reason: &str) {
    counter!("release_watch_skipped_total", "reason" => reason.to_string()).increment(1);
}

/// Record a release blob that failed to decode.
pub fn record_decode_failure(kind: &str) {
    counter!("release_watch_decode_failures_total", "kind" => kind.to_string()).increment(1);
}

/// Record a predecessor lookup result.
pub fn record_predecessor_lookup(result: &str) {
    counter!("release_watch_predecessor_lookups_total", "result" => result.to_string()).increment(1);
}

/// Record an error by type.
pub fn record_error(error_type: &str) {
    counter!("release_watch_errors_total", "type" => error_type.to_string()).increment(1);
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record how long a full listing took to land in the cache.
pub fn record_cache_sync(duration: Duration, records: usize) {
    histogram!("release_watch_cache_sync_duration_seconds").record(duration.as_secs_f64());
    gauge!("release_watch_cache_records").set(records as f64);
}

/// Records currently held in the local cache.
pub fn set_cache_size(records: usize) {
    gauge!("release_watch_cache_records").set(records as f64);
}

/// Record the watch stream being re-established.
pub fn record_watch_restart(reason: &str) {
    counter!("release_watch_watch_restarts_total", "reason" => reason.to_string()).increment(1);
}

// =============================================================================
// Controller Metrics
// =============================================================================

/// Gauge for controller state.
pub fn set_controller_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Syncing" => 1.0,
        "Running" => 2.0,
        "ShuttingDown" => 3.0,
        "Stopped" => 4.0,
        "Failed" => 5.0,
        _ => -1.0,
    };
    gauge!("release_watch_controller_state").set(value);
}

/// Busy workers.
pub fn set_active_workers(count: usize) {
    gauge!("release_watch_active_workers").set(count as f64);
}

// =============================================================================
// Circuit Breaker Metrics
// =============================================================================

/// Record circuit breaker call outcome.
pub fn record_circuit_call(circuit_name: &str, outcome: &str) {
    counter!(
        "release_watch_circuit_calls_total",
        "circuit" => circuit_name.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
