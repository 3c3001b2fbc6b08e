// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event sinks.
//!
//! A sink receives every classified release transition plus, once at
//! startup, the inventory of active releases. Which sink runs is decided by
//! whoever builds the [`Controller`](crate::controller::Controller); chat
//! and webhook sinks live outside this crate and implement [`EventSink`].
//!
//! Delivery is at-least-once. A sink that returns an error sees the same
//! event again after backoff, up to the queue's retry ceiling.
//!
//! # Example
//!
//! ```rust,no_run
//! use release_watch::event::ReleaseEvent;
//! use release_watch::release::ReleaseRecord;
//! use release_watch::sink::{EventSink, SinkFuture};
//!
//! struct Counter(std::sync::atomic::AtomicUsize);
//!
//! impl EventSink for Counter {
//!     fn name(&self) -> &str {
//!         "counter"
//!     }
//!
//!     fn on_event<'a>(&'a self, _event: &'a ReleaseEvent) -> SinkFuture<'a> {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn on_startup<'a>(&'a self, _releases: &'a [ReleaseRecord]) -> SinkFuture<'a> {
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//! ```

use crate::classifier::Action;
use crate::error::SinkError;
use crate::event::ReleaseEvent;
use crate::release::ReleaseRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

/// Result type for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Boxed future returned by sink callbacks.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = SinkResult<()>> + Send + 'a>>;

/// Receiver of classified release events.
pub trait EventSink: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Deliver one classified transition.
    fn on_event<'a>(&'a self, event: &'a ReleaseEvent) -> SinkFuture<'a>;

    /// Deliver the releases that were active when the watcher started.
    fn on_startup<'a>(&'a self, releases: &'a [ReleaseRecord]) -> SinkFuture<'a>;
}

/// Flat, serializable view of an event.
///
/// Field names match what webhook consumers of the watcher already parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub app_name: String,
    pub app_version: String,
    pub namespace: String,
    pub previous_app_version: String,
    pub action: Action,
    pub app_description: String,
    pub install_notes: String,
    pub chart_version: String,
    pub previous_chart_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message_prefix: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EventSummary {
    pub fn new(event: &ReleaseEvent, message_prefix: &str) -> Self {
        Self {
            app_name: event.app_name().to_string(),
            app_version: event.current.app_version().to_string(),
            namespace: event.current.namespace.clone(),
            previous_app_version: event.previous_app_version().to_string(),
            action: event.action,
            app_description: event.current.chart.metadata.description.clone(),
            install_notes: event.current.info.notes.clone(),
            chart_version: event.current.chart_version().to_string(),
            previous_chart_version: event.previous_chart_version().to_string(),
            message_prefix: message_prefix.to_string(),
            created_at: event.created_at,
            updated_at: event.modified_at,
        }
    }
}

/// One-line, human-readable description of an event.
pub fn headline(event: &ReleaseEvent) -> String {
    let name = event.app_name();
    let namespace = &event.current.namespace;
    let version = event.current.chart_version();
    let previous = event.previous_chart_version();

    match event.action {
        Action::PreInstall => format!("Installing {name} version {version} into namespace {namespace}"),
        Action::PreUpgrade => format!("Upgrading {name} from version {previous} to version {version} in namespace {namespace}"),
        Action::PreRollback => format!("Rolling back {name} from version {previous} to version {version} in namespace {namespace}"),
        Action::PreUninstall => format!("Uninstalling {name} from namespace {namespace}"),
        Action::PostInstall => format!("Installed {name} version {version} into namespace {namespace}"),
        Action::PostUpgrade => format!("Upgraded {name} from version {previous} to version {version} in namespace {namespace}"),
        Action::PostRollback => format!("Rolled back {name} from version {previous} to version {version} in namespace {namespace}"),
        Action::PostReplace => format!("Replaced {name} version {previous} with version {version} in namespace {namespace}"),
        Action::PostReplaceSuperseded => format!("Revision {} of {name} in namespace {namespace} superseded", event.current.revision),
        Action::PostUninstall => format!("Uninstalled {name} from namespace {namespace}"),
        Action::FailedInstall => format!("Installation of {name} version {version} in namespace {namespace} failed"),
        Action::FailedReplace => format!("Replacing {name} version {previous} with version {version} in namespace {namespace} failed"),
    }
}

/// Writes every event as a structured log line.
///
/// Config diffs are never logged.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    message_prefix: String,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix stamped on every summary and headline.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            message_prefix: prefix.into(),
        }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn on_event<'a>(&'a self, event: &'a ReleaseEvent) -> SinkFuture<'a> {
        Box::pin(async move {
            let summary = EventSummary::new(event, &self.message_prefix);
            // Plain strings and timestamps always serialize.
            let payload = serde_json::to_string(&summary).unwrap_or_default();
            info!(
                key = %event.key,
                kind = %event.kind,
                action = %event.action,
                revision = event.current.revision,
                summary = %payload,
                "{}{}",
                self.message_prefix,
                headline(event)
            );
            Ok(())
        })
    }

    fn on_startup<'a>(&'a self, releases: &'a [ReleaseRecord]) -> SinkFuture<'a> {
        Box::pin(async move {
            info!(count = releases.len(), "{}Watching releases", self.message_prefix);
            for release in releases {
                debug!(
                    release = %release.name,
                    namespace = %release.namespace,
                    status = %release.info.status,
                    chart_version = %release.chart_version(),
                    app_version = %release.app_version(),
                    "Active release"
                );
            }
            Ok(())
        })
    }
}
