// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Work items and dispatched events.

use crate::classifier::Action;
use crate::release::ReleaseRecord;
use crate::store::RecordKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which watch callback produced a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work on the reconciliation queue.
///
/// Built fresh by each watch callback and compared by value, so a
/// notification that arrives while an equal item is still waiting collapses
/// into it. Carries no object state: workers re-read the cache on dequeue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub key: RecordKey,
    pub kind: EventKind,
    pub record_type: String,
}

impl WorkItem {
    pub fn new(key: RecordKey, kind: EventKind, record_type: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            record_type: record_type.into(),
        }
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// A classified release transition, as handed to an event sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseEvent {
    pub key: RecordKey,
    pub kind: EventKind,
    pub action: Action,
    pub current: ReleaseRecord,
    pub previous: Option<ReleaseRecord>,

    /// Creation time of the stored record for this revision.
    pub created_at: DateTime<Utc>,

    /// Last write according to the record's `modifiedAt` label.
    pub modified_at: Option<DateTime<Utc>>,

    /// Unified diff of the values documents; present only when diffing is
    /// enabled. May contain secrets.
    pub config_diff: Option<String>,
}

impl ReleaseEvent {
    pub fn app_name(&self) -> &str {
        &self.current.name
    }

    pub fn previous_app_version(&self) -> &str {
        self.previous.as_ref().map(|p| p.app_version()).unwrap_or("")
    }

    pub fn previous_chart_version(&self) -> &str {
        self.previous.as_ref().map(|p| p.chart_version()).unwrap_or("")
    }

    /// True when the application version moved, as opposed to only the
    /// chart or values changing.
    pub fn is_app_version_changed(&self) -> bool {
        self.current.app_version() != self.previous_app_version()
    }
}
