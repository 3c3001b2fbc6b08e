// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Decoded release record.
//!
//! Mirrors the JSON document a Helm client writes into each release secret.
//! Only the fields the watcher reads are modelled; everything else in the
//! document (manifest, hooks, chart templates) is ignored on decode.
//!
//! ```text
//! {
//!   "name": "web",
//!   "namespace": "default",
//!   "version": 3,
//!   "info": { "status": "deployed", "description": "Upgrade complete", "notes": "..." },
//!   "chart": { "metadata": { "name": "web", "version": "1.4.0", "appVersion": "2.1" } },
//!   "config": { "replicas": 2 }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status written by the Helm client.
///
/// Unrecognised strings decode as [`Status::Unknown`] so newer clients never
/// break decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    Deployed,
    Failed,
    Superseded,
    Uninstalling,
    /// Left behind by `helm uninstall --keep-history`.
    Uninstalled,
    #[serde(other)]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
            Self::Uninstalling => "uninstalling",
            Self::Uninstalled => "uninstalled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `info` block of a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub status: Status,

    /// Free text set by the client, e.g. `"Upgrade complete"` or
    /// `"Rollback to 2"`. Classification keys off its prefix.
    #[serde(default)]
    pub description: String,

    /// Rendered NOTES.txt.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,

    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub first_deployed: Option<DateTime<Utc>>,

    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_deployed: Option<DateTime<Utc>>,
}

/// Chart metadata (`Chart.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartMetadata {
    #[serde(default)]
    pub name: String,

    /// Chart version; distinct from the application version.
    #[serde(default)]
    pub version: String,

    #[serde(default, rename = "appVersion")]
    pub app_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub metadata: ChartMetadata,
}

/// A decoded release revision.
///
/// Immutable once decoded. Owned by the pipeline invocation that decoded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Revision number, 1 for the first install.
    #[serde(rename = "version")]
    pub revision: u64,

    pub info: ReleaseInfo,

    #[serde(default)]
    pub chart: Chart,

    /// User-supplied values for this revision.
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ReleaseRecord {
    pub fn status(&self) -> Status {
        self.info.status
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }

    pub fn app_version(&self) -> &str {
        &self.chart.metadata.app_version
    }

    pub fn chart_version(&self) -> &str {
        &self.chart.metadata.version
    }

    pub fn chart_name(&self) -> &str {
        &self.chart.metadata.name
    }
}

/// Helm writes unset timestamps as `""`; treat those as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}
