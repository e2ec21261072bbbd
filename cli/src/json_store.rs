//! A record store kept as JSON files in a directory.
//!
//! Layout:
//!
//! ```text
//! <root>/hours.json       [ {record}, ... ]
//! <root>/logbook.json
//! ...
//! <root>/settings.json    { "key": value, ... }
//! ```
//!
//! Every mutation rewrites the affected file through a temporary file and a
//! rename, so a crash leaves either the old or the new file, never half of
//! one. A missing file reads as empty.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use worklog_sync::error::StoreResult;
use worklog_sync::{
    Catalog, CollectionName, Record, RecordId, RecordStore, StoreError, DEVICE_ID_KEY,
    SETTINGS_COLLECTION,
};

const EXTENSION: &str = "json";

/// JSON-directory implementation of [`RecordStore`].
#[derive(Debug)]
pub struct JsonDirStore {
    root: PathBuf,
    collections: BTreeSet<CollectionName>,
    // Serializes read-modify-write cycles on the files.
    write_lock: Mutex<()>,
}

impl JsonDirStore {
    /// Open (creating if needed) a store for the catalog's collections.
    ///
    /// A device id is generated on first open and kept from then on.
    pub async fn open(root: impl Into<PathBuf>, catalog: &Catalog) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let store = Self {
            root,
            collections: catalog.store_collections().into_iter().collect(),
            write_lock: Mutex::new(()),
        };

        let mut settings = store.read_settings().await?;
        if !settings.contains_key(DEVICE_ID_KEY) {
            let device_id = uuid::Uuid::new_v4().to_string();
            tracing::info!(%device_id, root = %store.root.display(), "initialised new store");
            settings.insert(DEVICE_ID_KEY.to_string(), Value::String(device_id));
            store.write_settings(&settings).await?;
        }
        Ok(store)
    }

    /// The data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check(&self, collection: &str) -> StoreResult<()> {
        if self.collections.contains(collection) {
            Ok(())
        } else {
            Err(StoreError::UnknownCollection(collection.to_string()))
        }
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{EXTENSION}"))
    }

    async fn read_collection(&self, name: &str) -> StoreResult<BTreeMap<RecordId, Record>> {
        let records: Vec<Record> = read_json(&self.path_of(name)).await?.unwrap_or_default();
        Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect())
    }

    async fn write_collection(
        &self,
        name: &str,
        records: &BTreeMap<RecordId, Record>,
    ) -> StoreResult<()> {
        let records: Vec<&Record> = records.values().collect();
        write_json(&self.path_of(name), &records).await
    }

    async fn read_settings(&self) -> StoreResult<BTreeMap<String, Value>> {
        Ok(read_json(&self.path_of(SETTINGS_COLLECTION))
            .await?
            .unwrap_or_default())
    }

    async fn write_settings(&self, settings: &BTreeMap<String, Value>) -> StoreResult<()> {
        write_json(&self.path_of(SETTINGS_COLLECTION), settings).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
    let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl RecordStore for JsonDirStore {
    async fn list_all(&self, collection: &str) -> StoreResult<Vec<Record>> {
        self.check(collection)?;
        Ok(self
            .read_collection(collection)
            .await?
            .into_values()
            .collect())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Record>> {
        self.check(collection)?;
        Ok(self.read_collection(collection).await?.remove(id))
    }

    async fn put(&self, collection: &str, record: Record) -> StoreResult<()> {
        self.check(collection)?;
        if record.id.is_empty() {
            return Err(StoreError::Malformed {
                collection: collection.to_string(),
                id: record.id,
                reason: "empty id".into(),
            });
        }
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_collection(collection).await?;
        records.insert(record.id.clone(), record);
        self.write_collection(collection, &records).await
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check(collection)?;
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_collection(collection).await?;
        if records.remove(id).is_some() {
            self.write_collection(collection, &records).await?;
        }
        Ok(())
    }

    async fn clear_all(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        for name in &self.collections {
            match fs::remove_file(self.path_of(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let mut settings = self.read_settings().await?;
        settings.retain(|key, _| key == DEVICE_ID_KEY);
        self.write_settings(&settings).await
    }

    async fn settings(&self) -> StoreResult<BTreeMap<String, Value>> {
        self.read_settings().await
    }

    async fn put_setting(&self, key: &str, value: Value) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.read_settings().await?;
        settings.insert(key.to_string(), value);
        self.write_settings(&settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn open(dir: &tempfile::TempDir) -> JsonDirStore {
        JsonDirStore::open(dir.path(), &Catalog::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn device_id_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = open(&dir).await.device_id().await.unwrap();
        let second = open(&dir).await.device_id().await.unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn records_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store
            .put("hours", Record::new("h1").with_date("2026-02-10"))
            .await
            .unwrap();
        store.put("hours", Record::new("h2")).await.unwrap();
        store.remove("hours", "h2").await.unwrap();
        store.remove("hours", "missing").await.unwrap();

        let reopened = open(&dir).await;
        let hours = reopened.list_all("hours").await.unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].date.as_deref(), Some("2026-02-10"));
        assert!(dir.path().join("hours.json").exists());
        assert!(!dir.path().join("hours.json.tmp").exists());
    }

    #[tokio::test]
    async fn clear_all_keeps_only_device_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let device = store.device_id().await.unwrap();
        store.put("goals", Record::new("g1")).await.unwrap();
        store.put_setting("theme", json!("dark")).await.unwrap();

        store.clear_all().await.unwrap();

        assert!(store.list_all("goals").await.unwrap().is_empty());
        let settings = store.settings().await.unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(store.device_id().await.unwrap(), device);
    }

    #[tokio::test]
    async fn unknown_collections_and_empty_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        assert!(matches!(
            store.put("recipes", Record::new("r1")).await,
            Err(StoreError::UnknownCollection(_))
        ));
        assert!(matches!(
            store.put("goals", Record::new("")).await,
            Err(StoreError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        std::fs::write(dir.path().join("logbook.json"), b"{ not json").unwrap();

        assert!(matches!(
            store.list_all("logbook").await,
            Err(StoreError::Io(_))
        ));
    }
}
