//! Record types for stored data.

use crate::timestamp::{stamp_millis, Stamp};
use crate::{CollectionName, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record in a named collection.
///
/// The fields the engine reasons about are explicit; every other domain field
/// is carried verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Identifier, unique within the record's collection
    pub id: RecordId,
    /// Last modification time, the recency signal for merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Stamp>,
    /// Calendar date (`YYYY-MM-DD`) for date-unique collections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// ISO week key (`2026-W07`) for week-unique collections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week: Option<String>,
    /// Remaining domain fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with no domain fields.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            updated_at: None,
            date: None,
            week: None,
            fields: Map::new(),
        }
    }

    /// Builder-style setter for `updatedAt`.
    pub fn with_updated_at(mut self, stamp: impl Into<Stamp>) -> Self {
        self.updated_at = Some(stamp.into());
        self
    }

    /// Builder-style setter for `date`.
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Builder-style setter for `week`.
    pub fn with_week(mut self, week: impl Into<String>) -> Self {
        self.week = Some(week.into());
        self
    }

    /// Builder-style setter for an arbitrary domain field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Read a record from its loosely-typed stored form.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Convert into the loosely-typed stored form.
    ///
    /// Domain fields never override the explicit ones.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        if let Some(stamp) = &self.updated_at {
            map.insert("updatedAt".into(), stamp.into());
        }
        if let Some(date) = &self.date {
            map.insert("date".into(), Value::String(date.clone()));
        }
        if let Some(week) = &self.week {
            map.insert("week".into(), Value::String(week.clone()));
        }
        for (name, value) in &self.fields {
            map.entry(name.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(map)
    }

    /// Recency of this record in epoch milliseconds.
    ///
    /// Falls back to `date` when `updatedAt` is absent; missing or
    /// unparseable values count as 0.
    pub fn recency(&self) -> Timestamp {
        match (&self.updated_at, &self.date) {
            (Some(stamp), _) => stamp.millis(),
            (None, Some(date)) => Stamp::Text(date.clone()).millis(),
            (None, None) => 0,
        }
    }
}

/// A recorded deletion stored in the reserved `deleted` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Id of the deleted record
    pub id: RecordId,
    /// Collection the record was deleted from
    pub store: CollectionName,
    /// When the deletion happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Stamp>,
}

impl Tombstone {
    /// Deletion time in epoch milliseconds (0 if missing or unparseable).
    pub fn deleted_millis(&self) -> Timestamp {
        stamp_millis(self.deleted_at.as_ref())
    }

    /// Whether this deletion supersedes a live record with the given recency.
    pub fn supersedes(&self, live: Option<&Record>) -> bool {
        match live {
            None => true,
            Some(record) => self.deleted_millis() > record.recency(),
        }
    }

    /// Read a tombstone from a record stored in the `deleted` collection.
    pub fn from_record(record: &Record) -> Option<Self> {
        Self::from_value(record.to_value()).ok()
    }

    /// Read a tombstone from its stored form.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Convert into a record for the `deleted` collection.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new(self.id.clone())
            .with_field("store", Value::String(self.store.clone()));
        if let Some(stamp) = &self.deleted_at {
            record.fields.insert("deletedAt".into(), stamp.into());
        }
        record
    }
}
