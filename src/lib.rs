//! # Release Watch
//!
//! Watches Helm release records and reports lifecycle transitions
//! (install, upgrade, rollback, uninstall, failures) to an event sink.
//!
//! ## Architecture
//!
//! Helm stores every revision of a release as its own record. The watcher
//! mirrors those records into a local cache, turns each change into a work
//! item, and lets a small worker pool classify what happened:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              release-watch                                │
//! │                                                                           │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────┐                   │
//! │  │ RecordStore │───►│  Reflector   │───►│  WorkQueue  │                   │
//! │  │ (list/watch)│    │ (cache diff) │    │ (dedup,     │                   │
//! │  └─────────────┘    └──────┬───────┘    │  backoff)   │                   │
//! │         ▲                  ▼            └──────┬──────┘                   │
//! │         │           ┌──────────────┐           ▼                          │
//! │         │           │ RecordCache  │◄───┌─────────────┐    ┌───────────┐  │
//! │         │           └──────────────┘    │  Pipeline   │───►│ EventSink │  │
//! │         └──── predecessor lookup ───────│ decode,     │    └───────────┘  │
//! │                                         │ classify    │                   │
//! │                                         └─────────────┘                   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! Events are delivered at least once. A failed item is retried with
//! per-item exponential backoff until it has been attempted
//! `queue.max_retries` times, then dropped and reported. Records that
//! already existed when the watcher started are not reported as new.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use release_watch::{Controller, WatcherConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = WatcherConfig::from_env().expect("invalid configuration");
//!     let mut controller = Controller::in_memory(config);
//!     controller.start().await.expect("Failed to start");
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     controller.shutdown().await;
//! }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod event;
pub mod metrics;
pub mod queue;
pub mod release;
pub mod resilience;
pub mod resolver;
pub mod sink;
pub mod store;

// Re-exports for convenience
pub use cache::{RecordCache, Reflector};
pub use circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use classifier::{classify, is_suppressed, Action};
pub use codec::decode;
pub use config::{QueueConfig, WatcherConfig};
pub use controller::{Controller, ControllerState, Disposition, Pipeline, ProcessOutcome};
pub use error::{DecodeError, Result, StoreError, WatchError};
pub use event::{EventKind, ReleaseEvent, WorkItem};
pub use queue::WorkQueue;
pub use release::{ReleaseRecord, Status};
pub use resolver::{previous_key, PredecessorResolver};
pub use sink::{EventSink, LogSink};
pub use store::{MemoryStore, RecordKey, RecordStore, StoredRecord};
