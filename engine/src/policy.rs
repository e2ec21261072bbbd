//! Collection catalog and uniqueness policies.
//!
//! The catalog lists the collections that take part in snapshots and tells
//! the merge resolver how each one is keyed. Policies are data, so the
//! resolver never branches on collection names.

use crate::{CollectionName, Record, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version this build of the engine understands.
pub const LOCAL_SCHEMA_VERSION: SchemaVersion = 2;

/// Reserved collection holding tombstones.
pub const DELETED_COLLECTION: &str = "deleted";

/// Reserved key of the settings collection inside snapshot data.
pub const SETTINGS_COLLECTION: &str = "settings";

/// Setting holding the device identity. Never exported, never imported.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Application-level uniqueness enforced on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionPolicy {
    /// Keyed by id only
    #[default]
    Plain,
    /// At most one record per calendar date
    UniqueDate,
    /// At most one record per ISO week
    UniqueWeek,
}

impl CollectionPolicy {
    /// The secondary unique key of a record under this policy, if any.
    pub fn unique_key<'r>(&self, record: &'r Record) -> Option<&'r str> {
        match self {
            CollectionPolicy::Plain => None,
            CollectionPolicy::UniqueDate => record.date.as_deref(),
            CollectionPolicy::UniqueWeek => record.week.as_deref(),
        }
    }
}

/// A collection known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSpec {
    /// Collection name
    pub name: CollectionName,
    /// Uniqueness policy
    pub policy: CollectionPolicy,
    /// Privacy-sensitive collections are exported only on request
    pub sensitive: bool,
}

impl CollectionSpec {
    /// A plain, id-keyed collection.
    pub fn plain(name: impl Into<CollectionName>) -> Self {
        Self::new(name, CollectionPolicy::Plain)
    }

    /// A collection with the given policy.
    pub fn new(name: impl Into<CollectionName>, policy: CollectionPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            sensitive: false,
        }
    }

    /// Mark the collection as privacy-sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// The set of collections taking part in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Schema version for forward-compatibility checks
    pub version: SchemaVersion,
    /// Collections by name
    pub collections: BTreeMap<CollectionName, CollectionSpec>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            collections: BTreeMap::new(),
        }
    }

    /// Add a collection to the catalog.
    pub fn add_collection(&mut self, collection: CollectionSpec) -> &mut Self {
        self.collections.insert(collection.name.clone(), collection);
        self
    }

    /// Builder-style method to add a collection.
    pub fn with_collection(mut self, collection: CollectionSpec) -> Self {
        self.add_collection(collection);
        self
    }

    /// Policy for a collection; unknown collections are treated as plain.
    pub fn policy_of(&self, name: &str) -> CollectionPolicy {
        self.collections
            .get(name)
            .map(|c| c.policy)
            .unwrap_or_default()
    }

    /// Names of the collections a snapshot captures, tombstones included.
    pub fn snapshot_collections(&self, include_sensitive: bool) -> Vec<CollectionName> {
        let mut names: Vec<CollectionName> = self
            .collections
            .values()
            .filter(|c| include_sensitive || !c.sensitive)
            .map(|c| c.name.clone())
            .collect();
        names.push(DELETED_COLLECTION.to_string());
        names
    }

    /// Every collection a store must hold, tombstones included.
    pub fn store_collections(&self) -> Vec<CollectionName> {
        self.snapshot_collections(true)
    }
}

impl Default for Catalog {
    /// The tracking application's collections.
    fn default() -> Self {
        Catalog::new(LOCAL_SCHEMA_VERSION)
            .with_collection(CollectionSpec::new("hours", CollectionPolicy::UniqueDate))
            .with_collection(CollectionSpec::plain("logbook"))
            .with_collection(CollectionSpec::plain("competencies"))
            .with_collection(CollectionSpec::plain("goals"))
            .with_collection(CollectionSpec::new(
                "reflections",
                CollectionPolicy::UniqueWeek,
            ))
            .with_collection(
                CollectionSpec::new("wellbeing", CollectionPolicy::UniqueDate).sensitive(),
            )
    }
}
