// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lifecycle action classification.
//!
//! Maps a release's status, whether it has a predecessor, and the prefix of
//! its description onto an [`Action`]:
//!
//! | status | predecessor | description | action |
//! |--------|-------------|-------------|--------|
//! | pending-install | any | any | `PRE_INSTALL` |
//! | pending-upgrade | any | any | `PRE_UPGRADE` |
//! | pending-rollback | any | any | `PRE_ROLLBACK` |
//! | deployed | none | any | `POST_INSTALL` |
//! | deployed | some | `Rollback…` | `POST_ROLLBACK` |
//! | deployed | some | `Upgrade…` | `POST_UPGRADE` |
//! | deployed | some | other | `POST_REPLACE` |
//! | failed | none | any | `FAILED_INSTALL` |
//! | failed | some | any | `FAILED_REPLACE` |
//! | superseded | any | any | `POST_REPLACE-SUPERSEDED` |
//! | uninstalled | any | any | `POST_UNINSTALL` |
//! | anything else | any | any | `PRE_UNINSTALL` |
//!
//! A failed revision with a predecessor could be a failed upgrade or a
//! failed rollback; the stored record does not say which, so it is reported
//! as `FAILED_REPLACE`.

use crate::event::EventKind;
use crate::release::{ReleaseRecord, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle action derived from a release transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "PRE_INSTALL")]
    PreInstall,
    #[serde(rename = "PRE_UPGRADE")]
    PreUpgrade,
    #[serde(rename = "PRE_ROLLBACK")]
    PreRollback,
    #[serde(rename = "PRE_UNINSTALL")]
    PreUninstall,
    #[serde(rename = "POST_INSTALL")]
    PostInstall,
    #[serde(rename = "POST_UPGRADE")]
    PostUpgrade,
    #[serde(rename = "POST_ROLLBACK")]
    PostRollback,
    #[serde(rename = "POST_REPLACE")]
    PostReplace,
    #[serde(rename = "POST_REPLACE-SUPERSEDED")]
    PostReplaceSuperseded,
    #[serde(rename = "POST_UNINSTALL")]
    PostUninstall,
    #[serde(rename = "FAILED_INSTALL")]
    FailedInstall,
    #[serde(rename = "FAILED_REPLACE")]
    FailedReplace,
}

impl Action {
    pub const ALL: [Action; 12] = [
        Action::PreInstall,
        Action::PreUpgrade,
        Action::PreRollback,
        Action::PreUninstall,
        Action::PostInstall,
        Action::PostUpgrade,
        Action::PostRollback,
        Action::PostReplace,
        Action::PostReplaceSuperseded,
        Action::PostUninstall,
        Action::FailedInstall,
        Action::FailedReplace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreInstall => "PRE_INSTALL",
            Self::PreUpgrade => "PRE_UPGRADE",
            Self::PreRollback => "PRE_ROLLBACK",
            Self::PreUninstall => "PRE_UNINSTALL",
            Self::PostInstall => "POST_INSTALL",
            Self::PostUpgrade => "POST_UPGRADE",
            Self::PostRollback => "POST_ROLLBACK",
            Self::PostReplace => "POST_REPLACE",
            Self::PostReplaceSuperseded => "POST_REPLACE-SUPERSEDED",
            Self::PostUninstall => "POST_UNINSTALL",
            Self::FailedInstall => "FAILED_INSTALL",
            Self::FailedReplace => "FAILED_REPLACE",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedInstall | Self::FailedReplace)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a release transition.
///
/// Pure and deterministic.
pub fn classify(current: &ReleaseRecord, previous: Option<&ReleaseRecord>) -> Action {
    match current.info.status {
        Status::PendingInstall => Action::PreInstall,
        Status::PendingUpgrade => Action::PreUpgrade,
        Status::PendingRollback => Action::PreRollback,
        Status::Deployed => match previous {
            None => Action::PostInstall,
            Some(_) if current.info.description.starts_with("Rollback") => Action::PostRollback,
            Some(_) if current.info.description.starts_with("Upgrade") => Action::PostUpgrade,
            Some(_) => Action::PostReplace,
        },
        Status::Failed if previous.is_none() => Action::FailedInstall,
        Status::Failed => Action::FailedReplace,
        Status::Superseded => Action::PostReplaceSuperseded,
        Status::Uninstalled => Action::PostUninstall,
        Status::Uninstalling | Status::Unknown => Action::PreUninstall,
    }
}

/// Whether a notification replays state that existed before the watcher
/// started.
///
/// The initial listing reports every existing record as created; those are
/// history, not new events. Only `created` notifications are ever
/// suppressed, and only when the record is no newer than `started_at`.
pub fn is_suppressed(kind: EventKind, created_at: DateTime<Utc>, started_at: DateTime<Utc>) -> bool {
    kind == EventKind::Created && created_at <= started_at
}
