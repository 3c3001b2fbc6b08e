//! Builders for releases and the records that store them.

use chrono::{DateTime, Duration, Utc};
use release_watch::codec;
use release_watch::release::{Chart, ChartMetadata, ReleaseInfo, ReleaseRecord, Status};
use release_watch::store::{RecordKey, StoredRecord, MODIFIED_AT_LABEL, RELEASE_RECORD_TYPE};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Name Helm gives the record holding `release` at `revision`.
pub fn record_name(release: &str, revision: u64) -> String {
    format!("sh.helm.release.v1.{release}.v{revision}")
}

pub fn release_key(namespace: &str, release: &str, revision: u64) -> RecordKey {
    RecordKey::new(namespace, record_name(release, revision))
}

/// Fluent builder for a decoded release.
#[derive(Debug, Clone)]
pub struct ReleaseBuilder {
    record: ReleaseRecord,
}

impl ReleaseBuilder {
    pub fn new(name: &str, revision: u64) -> Self {
        Self {
            record: ReleaseRecord {
                name: name.to_string(),
                namespace: "default".to_string(),
                revision,
                info: ReleaseInfo {
                    status: Status::Deployed,
                    description: "Install complete".to_string(),
                    notes: String::new(),
                    first_deployed: None,
                    last_deployed: None,
                },
                chart: Chart {
                    metadata: ChartMetadata {
                        name: name.to_string(),
                        version: format!("1.0.{revision}"),
                        app_version: format!("{revision}.0"),
                        description: String::new(),
                    },
                },
                config: Default::default(),
            },
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.record.namespace = namespace.to_string();
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.record.info.status = status;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.record.info.description = description.to_string();
        self
    }

    pub fn chart_version(mut self, version: &str) -> Self {
        self.record.chart.metadata.version = version.to_string();
        self
    }

    pub fn app_version(mut self, version: &str) -> Self {
        self.record.chart.metadata.app_version = version.to_string();
        self
    }

    pub fn value(mut self, key: &str, value: serde_json::Value) -> Self {
        self.record.config.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> ReleaseRecord {
        self.record
    }
}

/// Wrap a release in a stored record named the way Helm names it.
pub fn stored(release: &ReleaseRecord, created_at: DateTime<Utc>) -> StoredRecord {
    stored_payload(
        release_key(&release.namespace, &release.name, release.revision),
        codec::encode(release).expect("encode release"),
        created_at,
    )
}

/// A release record with an arbitrary payload.
///
/// Every call gets a fresh resource version, so a rewritten record is seen
/// as a change.
pub fn stored_payload(key: RecordKey, payload: Vec<u8>, created_at: DateTime<Utc>) -> StoredRecord {
    let mut labels = BTreeMap::new();
    labels.insert(MODIFIED_AT_LABEL.to_string(), created_at.timestamp().to_string());
    StoredRecord {
        key,
        record_type: RELEASE_RECORD_TYPE.to_string(),
        created_at,
        resource_version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed).to_string(),
        labels,
        payload,
    }
}

/// A record that is not a release (plain opaque secret).
pub fn opaque(namespace: &str, name: &str, created_at: DateTime<Utc>) -> StoredRecord {
    StoredRecord {
        key: RecordKey::new(namespace, name),
        record_type: "Opaque".to_string(),
        created_at,
        resource_version: String::new(),
        labels: BTreeMap::new(),
        payload: b"c2VjcmV0".to_vec(),
    }
}

/// A point in time well before any test starts.
pub fn long_ago() -> DateTime<Utc> {
    Utc::now() - Duration::hours(1)
}

/// A point in time safely after a controller constructed now.
pub fn later() -> DateTime<Utc> {
    Utc::now() + Duration::hours(1)
}
