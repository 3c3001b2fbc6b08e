//! Controller state and per-item outcome types.
//!
//! # State Transitions
//!
//! ```text
//!                  start()
//! Created ───────────────────→ Syncing
//!                                  │
//!              (sync timeout)      │ (cache synced)
//!           ┌──────────────────────┤
//!           ↓                      ↓
//!        Failed                 Running
//!                                  │
//!                        shutdown()│
//!                                  ↓
//!                            ShuttingDown ───→ Stopped
//! ```
//!
//! # Item Outcomes
//!
//! ```text
//! Enqueued ──get──► Processing ──ok──────────────────────► Done
//!    ▲                  │
//!    │                  ├─err, attempt < ceiling──► Retrying(n) ──backoff──┐
//!    │                  │                                                  │
//!    └──────────────────┼──────────────────────────────────────────────────┘
//!                       └─err, attempt = ceiling──► GivenUp (reported)
//! ```

use crate::classifier::Action;

/// Lifecycle state of a [`Controller`](super::Controller).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Constructed; nothing running.
    Created,

    /// Reflector started, waiting for the first listing.
    Syncing,

    /// Cache synced and workers draining the queue.
    Running,

    /// Queue closed; in-flight items finishing.
    ShuttingDown,

    /// All tasks joined.
    Stopped,

    /// The cache never synced. Startup aborted.
    Failed,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Created => write!(f, "Created"),
            ControllerState::Syncing => write!(f, "Syncing"),
            ControllerState::Running => write!(f, "Running"),
            ControllerState::ShuttingDown => write!(f, "ShuttingDown"),
            ControllerState::Stopped => write!(f, "Stopped"),
            ControllerState::Failed => write!(f, "Failed"),
        }
    }
}

/// Why an item completed without reaching the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record is no longer in the cache (typically a delete).
    Gone,
    /// Not a release record.
    NotRelease,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Gone => "gone",
            SkipReason::NotRelease => "not_release",
        }
    }
}

/// Successful result of running the pipeline on one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Classified and delivered to the sink.
    Dispatched(Action),
    /// A created notification for a record that predates startup.
    Suppressed,
    /// Nothing to do.
    Skipped(SkipReason),
}

/// What one call to `process_next_item` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Item finished; its retry history is cleared.
    Done(Disposition),
    /// Item failed and was requeued. `attempt` is the attempt that failed.
    Retrying { attempt: usize },
    /// Item failed for the last time and was dropped after reporting.
    GivenUp { attempts: usize },
    /// The queue is shut down; the worker should exit.
    ShutDown,
}
