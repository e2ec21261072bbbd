//! Record store access.
//!
//! The engine reads and writes the local dataset only through
//! [`RecordStore`]. Stores are assumed reliable and transactionally safe at
//! single-record level; the engine tolerates individual write failures on
//! its own.

use crate::error::{StoreError, StoreResult};
use crate::policy::DEVICE_ID_KEY;
use crate::{Catalog, CollectionName, DeviceId, Record, RecordId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Per-collection CRUD over the local dataset.
///
/// Settings live beside the collections as a key/value map. The device
/// identity is a setting under [`DEVICE_ID_KEY`] and belongs to the store:
/// [`RecordStore::clear_all`] must keep it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record of a collection.
    async fn list_all(&self, collection: &str) -> StoreResult<Vec<Record>>;

    /// A single record, `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Record>>;

    /// Insert or overwrite a record by id.
    async fn put(&self, collection: &str, record: Record) -> StoreResult<()>;

    /// Remove a record. Removing an absent record is not an error.
    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Empty every collection and every setting except the device identity.
    async fn clear_all(&self) -> StoreResult<()>;

    /// All settings, device identity included.
    async fn settings(&self) -> StoreResult<BTreeMap<String, Value>>;

    /// Write one setting.
    async fn put_setting(&self, key: &str, value: Value) -> StoreResult<()>;

    /// The device identity, if one has been assigned.
    async fn device_id(&self) -> StoreResult<Option<DeviceId>> {
        let settings = self.settings().await?;
        Ok(settings
            .get(DEVICE_ID_KEY)
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

/// A full, ordered copy of a store's contents, used to compare stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDump {
    /// Records by collection, then by id
    pub collections: BTreeMap<CollectionName, BTreeMap<RecordId, Record>>,
    /// All settings
    pub settings: BTreeMap<String, Value>,
}

impl StoreDump {
    /// Read everything a store holds for the given collections.
    pub async fn capture<S: RecordStore + ?Sized>(
        store: &S,
        collections: &[CollectionName],
    ) -> StoreResult<Self> {
        let mut dump = StoreDump {
            settings: store.settings().await?,
            ..Default::default()
        };
        for name in collections {
            let records = store.list_all(name).await?;
            dump.collections.insert(
                name.clone(),
                records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            );
        }
        Ok(dump)
    }

    /// Number of records in one collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// A record by collection and id.
    pub fn get(&self, collection: &str, id: &str) -> Option<&Record> {
        self.collections.get(collection)?.get(id)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<CollectionName, BTreeMap<RecordId, Record>>,
    settings: BTreeMap<String, Value>,
}

/// An in-memory record store.
///
/// Collections are fixed at creation from the catalog; writes to any other
/// collection fail with [`StoreError::UnknownCollection`].
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store for the catalog's collections with a fresh
    /// device identity.
    pub fn new(catalog: &Catalog) -> Self {
        Self::with_device_id(catalog, uuid::Uuid::new_v4().to_string())
    }

    /// Create an empty store with the given device identity.
    pub fn with_device_id(catalog: &Catalog, device_id: impl Into<DeviceId>) -> Self {
        let mut state = MemoryState::default();
        for name in catalog.store_collections() {
            state.collections.insert(name, BTreeMap::new());
        }
        state
            .settings
            .insert(DEVICE_ID_KEY.to_string(), Value::String(device_id.into()));

        Self {
            state: RwLock::new(state),
        }
    }

    /// Snapshot of everything the store holds.
    pub async fn dump(&self) -> StoreDump {
        let state = self.state.read().await;
        StoreDump {
            collections: state
                .collections
                .iter()
                .map(|(name, records)| (name.clone(), records.clone()))
                .collect(),
            settings: state.settings.clone(),
        }
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        let state = self.state.read().await;
        state.collections.get(collection).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_all(&self, collection: &str) -> StoreResult<Vec<Record>> {
        let state = self.state.read().await;
        state
            .collections
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Record>> {
        let state = self.state.read().await;
        let records = state
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(records.get(id).cloned())
    }

    async fn put(&self, collection: &str, record: Record) -> StoreResult<()> {
        if record.id.is_empty() {
            return Err(StoreError::Malformed {
                collection: collection.to_string(),
                id: record.id,
                reason: "empty id".into(),
            });
        }
        let mut state = self.state.write().await;
        let records = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let records = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        records.remove(id);
        Ok(())
    }

    async fn clear_all(&self) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for records in state.collections.values_mut() {
            records.clear();
        }
        state.settings.retain(|key, _| key == DEVICE_ID_KEY);
        Ok(())
    }

    async fn settings(&self) -> StoreResult<BTreeMap<String, Value>> {
        Ok(self.state.read().await.settings.clone())
    }

    async fn put_setting(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.settings.insert(key.to_string(), value);
        Ok(())
    }
}
