// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the release watcher.
//!
//! Errors are split by the layer that produces them: the release codec
//! ([`DecodeError`]), record store implementations ([`StoreError`]), event
//! sinks ([`SinkError`]) and the controller itself ([`WatchError`]).
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Decode` | Yes | Current release blob failed to decode |
//! | `Store` | Yes | Record store unreachable or watch dropped |
//! | `Sink` | Yes | Event sink failed to deliver |
//! | `SyncTimeout` | No | Local cache never finished its initial sync |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Controller state machine violation |
//!
//! # Retry Behavior
//!
//! Work items whose processing fails with a retryable error are requeued
//! through the rate limiter until the retry ceiling is reached. Anything
//! else is handed to [`report_error`] straight away.
//!
//! None of these errors carry release payload contents. Release values can
//! hold credentials, so decode failures only record where parsing stopped.

use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Failure to turn a stored blob into a [`ReleaseRecord`](crate::release::ReleaseRecord).
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The outer base64 layer is malformed.
    #[error("invalid base64 encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    /// The blob carried the gzip magic but the stream would not inflate.
    #[error("corrupt gzip stream: {0}")]
    CorruptStream(#[source] std::io::Error),

    /// The decoded bytes are not a release document.
    ///
    /// Only the parse position and category are kept; the underlying
    /// `serde_json` message may quote the offending value.
    #[error("release schema mismatch ({category}) at line {line}, column {column}")]
    SchemaMismatch {
        category: &'static str,
        line: usize,
        column: usize,
    },
}

impl DecodeError {
    pub(crate) fn schema(err: &serde_json::Error) -> Self {
        let category = match err.classify() {
            serde_json::error::Category::Io => "io",
            serde_json::error::Category::Syntax => "syntax",
            serde_json::error::Category::Data => "data",
            serde_json::error::Category::Eof => "eof",
        };
        Self::SchemaMismatch {
            category,
            line: err.line(),
            column: err.column(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEncoding(_) => "invalid_encoding",
            Self::CorruptStream(_) => "corrupt_stream",
            Self::SchemaMismatch { .. } => "schema_mismatch",
        }
    }
}

/// Errors reported by a [`RecordStore`](crate::store::RecordStore).
///
/// A missing record is not an error; `get` returns `Ok(None)` for that.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The backing API could not be reached or refused the request.
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("record store request timed out after {0:?}")]
    Timeout(Duration),

    /// The watcher fell behind and notifications were dropped.
    #[error("watch lagged, {0} notifications skipped")]
    WatchLagged(u64),
}

/// Error returned by an [`EventSink`](crate::sink::EventSink).
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Errors that can occur while watching releases.
///
/// Use [`is_retryable()`](Self::is_retryable) to decide whether a work item
/// goes back on the queue.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The current release blob could not be decoded.
    ///
    /// Retryable: the record may be rewritten by the next revision write,
    /// and the retry ceiling bounds the cost if it is not.
    #[error("failed to decode release {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: DecodeError,
    },

    /// Record store failure (list, watch, or point lookup).
    #[error("record store error ({operation}): {source}")]
    Store {
        operation: String,
        #[source]
        source: StoreError,
    },

    /// The event sink failed to deliver.
    #[error("event sink {sink} failed: {message}")]
    Sink { sink: String, message: String },

    /// The local cache did not finish its initial listing in time.
    ///
    /// Fatal at startup.
    #[error("local cache did not sync within {timeout:?}")]
    SyncTimeout { timeout: Duration },

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Controller state machine violation (e.g. `start()` twice).
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl WatchError {
    /// Create a store error tagged with the failing operation.
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            operation: operation.into(),
            source,
        }
    }

    /// Create a sink error from a [`SinkError`].
    pub fn sink(sink: impl Into<String>, source: SinkError) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: source.0,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Decode { .. } => true,
            Self::Store { .. } => true,
            Self::Sink { .. } => true,
            Self::SyncTimeout { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Store { .. } => "store",
            Self::Sink { .. } => "sink",
            Self::SyncTimeout { .. } => "sync_timeout",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
        }
    }
}

/// Process-wide error reporter.
///
/// Called for errors that are dropped rather than retried (retry ceiling
/// reached, non-retryable failure). Emits one structured log line and bumps
/// the error counter.
pub fn report_error(context: &str, err: &WatchError) {
    crate::metrics::record_error(err.kind());
    error!(context, error = %err, retryable = err.is_retryable(), "Dropping work item after error");
}
