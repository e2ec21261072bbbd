//! Snapshot types: the portable, self-describing copy of a store.
//!
//! Snapshots serialize to a JSON document with exactly two top-level fields,
//! `meta` and `data`. Collections are kept in `BTreeMap`s so serialization
//! order is deterministic.

use crate::{error::Result, CollectionName, DeviceId, Error, SchemaVersion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Descriptive metadata carried alongside snapshot data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    /// Version of the application that produced the snapshot
    pub app_version: String,
    /// Schema version at time of capture
    pub schema_version: SchemaVersion,
    /// Device that produced the snapshot
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Capture time, RFC 3339
    pub exported_at: String,
    /// Record count per collection. Informational only.
    #[serde(default)]
    pub store_counts: BTreeMap<CollectionName, usize>,
}

/// The captured collections.
///
/// Records stay in their loosely-typed stored form here; they are read into
/// [`crate::Record`] one at a time when applied, so a single malformed record
/// never invalidates the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Key/value settings, device identity excluded
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    /// Records by collection name, in capture order
    #[serde(flatten)]
    pub collections: BTreeMap<CollectionName, Vec<Value>>,
}

impl SnapshotData {
    /// Records of one collection.
    pub fn records(&self, collection: &str) -> &[Value] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Record count per collection.
    pub fn counts(&self) -> BTreeMap<CollectionName, usize> {
        self.collections
            .iter()
            .map(|(name, records)| (name.clone(), records.len()))
            .collect()
    }

    /// Total number of records across collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// An atomic point-in-time copy of all participating collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub data: SnapshotData,
}

impl Snapshot {
    /// Serialize to canonical JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse a snapshot document.
    ///
    /// Fails with [`Error::Format`] when the text is not JSON, when `meta` or
    /// `data` is absent, or when either has the wrong shape. The schema
    /// version is not checked here.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(json)
            .map_err(|e| Error::Format(format!("not a snapshot document: {e}")))?;

        let object = document
            .as_object()
            .ok_or_else(|| Error::Format("snapshot must be a JSON object".into()))?;
        for field in ["meta", "data"] {
            if !object.contains_key(field) {
                return Err(Error::Format(format!("missing '{field}' section")));
            }
        }

        serde_json::from_value(document).map_err(|e| Error::Format(e.to_string()))
    }

    /// A short description for previews before an import is committed.
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary::from(self)
    }
}

/// Preview of a snapshot, without the records themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub app_version: String,
    pub schema_version: SchemaVersion,
    pub device_id: Option<DeviceId>,
    pub exported_at: String,
    /// Counts of the records actually present in `data`
    pub record_counts: BTreeMap<CollectionName, usize>,
    pub setting_count: usize,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            app_version: snapshot.meta.app_version.clone(),
            schema_version: snapshot.meta.schema_version,
            device_id: snapshot.meta.device_id.clone(),
            exported_at: snapshot.meta.exported_at.clone(),
            record_counts: snapshot.data.counts(),
            setting_count: snapshot.data.settings.len(),
        }
    }
}
