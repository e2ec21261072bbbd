//! Merge resolution of imported snapshot data against the local store.
//!
//! # Algorithm
//!
//! 1. Settings: every imported setting overwrites the local one, except the
//!    device identity which is never imported
//! 2. Regular collections, one at a time, records one at a time:
//!    - same id locally: strictly newer `updatedAt` wins, ties keep local
//!    - new id in a unique-field collection whose date/week is already taken
//!      by a different local record: the newer of the two survives
//!    - otherwise the imported record is inserted
//! 3. Tombstones last, so deletions propagate forward over what was merged:
//!    a deletion wins when the live record is absent or older than it
//!
//! Disagreements are never errors. Per-record write failures are counted as
//! skipped; only a store that is unavailable as a whole aborts the merge.

use crate::error::{StoreError, StoreResult};
use crate::policy::{CollectionPolicy, DELETED_COLLECTION, DEVICE_ID_KEY};
use crate::{Catalog, CollectionName, Record, RecordId, RecordStore, SnapshotData, Tombstone};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// How a conflict between a local and an imported record was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    /// Same id, imported record newer and written
    Imported,
    /// Same id, local record kept
    Kept,
    /// Different id on the same date, imported record replaced the local one
    ImportedReplacesByDate,
    /// Different id in the same week, imported record replaced the local one
    ImportedReplacesByWeek,
    /// Different id on the same date/week, local record newer and kept
    KeptExistingNewer,
}

impl Resolution {
    fn replaces_by(policy: CollectionPolicy) -> Self {
        match policy {
            CollectionPolicy::UniqueWeek => Resolution::ImportedReplacesByWeek,
            _ => Resolution::ImportedReplacesByDate,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Resolution::Imported => "imported",
            Resolution::Kept => "kept",
            Resolution::ImportedReplacesByDate => "imported replaces by date",
            Resolution::ImportedReplacesByWeek => "imported replaces by week",
            Resolution::KeptExistingNewer => "kept, existing newer",
        };
        f.write_str(text)
    }
}

/// A resolved conflict, logged for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Collection the conflict occurred in
    pub collection: CollectionName,
    /// Id of the imported record
    pub id: RecordId,
    /// How it was resolved
    pub resolution: Resolution,
}

/// Counters and conflict log of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Records, tombstones and settings written
    pub merged: usize,
    /// Imports discarded or that failed to write
    pub skipped: usize,
    /// Every conflict decision, in processing order
    pub conflicts: Vec<Conflict>,
}

/// Whether a store failure must abort the merge instead of skipping a record.
fn is_fatal(err: &StoreError) -> bool {
    matches!(err, StoreError::Unavailable(_))
}

/// Local view of one collection during merge.
///
/// Built once from the store before the collection's imports are processed
/// and kept current as records are written or removed.
struct LocalView {
    policy: CollectionPolicy,
    records: HashMap<RecordId, Record>,
    /// Unique date/week key to the id of the record holding it
    by_key: HashMap<String, RecordId>,
}

impl LocalView {
    fn new(policy: CollectionPolicy, records: Vec<Record>) -> Self {
        let mut view = Self {
            policy,
            records: HashMap::with_capacity(records.len()),
            by_key: HashMap::new(),
        };
        for record in records {
            view.insert(record);
        }
        view
    }

    fn insert(&mut self, record: Record) {
        if let Some(previous) = self.records.get(&record.id) {
            if let Some(old_key) = self.policy.unique_key(previous) {
                if self.by_key.get(old_key) == Some(&record.id) {
                    self.by_key.remove(old_key);
                }
            }
        }
        if let Some(key) = self.policy.unique_key(&record) {
            self.by_key.insert(key.to_string(), record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &str) {
        if let Some(record) = self.records.remove(id) {
            if let Some(key) = self.policy.unique_key(&record) {
                if self.by_key.get(key).map(String::as_str) == Some(id) {
                    self.by_key.remove(key);
                }
            }
        }
    }

    /// A different record occupying the imported record's date/week.
    fn occupant_of(&self, imported: &Record) -> Option<&Record> {
        let key = self.policy.unique_key(imported)?;
        let id = self.by_key.get(key)?;
        if *id == imported.id {
            return None;
        }
        self.records.get(id)
    }
}

/// Applies imported snapshot data to a store using recency and uniqueness.
pub struct MergeResolver<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    catalog: &'a Catalog,
    report: MergeReport,
}

impl<'a, S: RecordStore + ?Sized> MergeResolver<'a, S> {
    /// Create a resolver writing into `store`.
    pub fn new(store: &'a S, catalog: &'a Catalog) -> Self {
        Self {
            store,
            catalog,
            report: MergeReport::default(),
        }
    }

    /// Merge imported data into the store and return the report.
    pub async fn merge(mut self, data: &SnapshotData) -> StoreResult<MergeReport> {
        self.merge_settings(&data.settings).await?;

        for (name, records) in &data.collections {
            if name == DELETED_COLLECTION {
                continue;
            }
            self.merge_collection(name, records).await?;
        }

        if let Some(tombstones) = data.collections.get(DELETED_COLLECTION) {
            self.merge_tombstones(tombstones).await?;
        }

        Ok(self.report)
    }

    async fn merge_settings(&mut self, settings: &BTreeMap<String, Value>) -> StoreResult<()> {
        for (key, value) in settings {
            if key == DEVICE_ID_KEY {
                continue;
            }
            match self.store.put_setting(key, value.clone()).await {
                Ok(()) => self.report.merged += 1,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to write imported setting");
                    self.report.skipped += 1;
                }
            }
        }
        Ok(())
    }

    async fn merge_collection(&mut self, name: &str, records: &[Value]) -> StoreResult<()> {
        let policy = self.catalog.policy_of(name);
        let local = match self.store.list_all(name).await {
            Ok(local) => local,
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!(collection = %name, error = %e, "local collection unreadable, merging into empty view");
                Vec::new()
            }
        };
        let mut view = LocalView::new(policy, local);

        for value in records {
            let imported = match Record::from_value(value.clone()) {
                Ok(record) => record,
                Err(e) => {
                    debug!(collection = %name, error = %e, "skipping malformed imported record");
                    self.report.skipped += 1;
                    continue;
                }
            };
            self.merge_record(name, &mut view, imported).await?;
        }
        Ok(())
    }

    async fn merge_record(
        &mut self,
        name: &str,
        view: &mut LocalView,
        imported: Record,
    ) -> StoreResult<()> {
        let incoming = imported.recency();

        // Same id on both sides: plain recency comparison.
        if let Some(existing) = view.records.get(&imported.id) {
            if incoming <= existing.recency() {
                self.log(name, &imported.id, Resolution::Kept);
                self.report.skipped += 1;
                return Ok(());
            }
            // A changed date/week must not land on another record's slot
            // unless that record is older too.
            if let Some(occupant) = view.occupant_of(&imported) {
                if incoming <= occupant.recency() {
                    self.log(name, &imported.id, Resolution::KeptExistingNewer);
                    self.report.skipped += 1;
                    return Ok(());
                }
                let displaced = occupant.id.clone();
                if self.write(name, view, imported.clone()).await? {
                    self.displace(name, view, &displaced).await?;
                    self.log(name, &imported.id, Resolution::Imported);
                }
                return Ok(());
            }
            if self.write(name, view, imported.clone()).await? {
                self.log(name, &imported.id, Resolution::Imported);
            }
            return Ok(());
        }

        // New id: only the date/week can clash.
        if let Some(occupant) = view.occupant_of(&imported) {
            if incoming <= occupant.recency() {
                self.log(name, &imported.id, Resolution::KeptExistingNewer);
                self.report.skipped += 1;
                return Ok(());
            }
            let displaced = occupant.id.clone();
            if self.write(name, view, imported.clone()).await? {
                self.displace(name, view, &displaced).await?;
                self.log(name, &imported.id, Resolution::replaces_by(view.policy));
            }
            return Ok(());
        }

        self.write(name, view, imported).await?;
        Ok(())
    }

    /// Write an imported record, counting the outcome. Returns whether it
    /// was written.
    async fn write(
        &mut self,
        name: &str,
        view: &mut LocalView,
        record: Record,
    ) -> StoreResult<bool> {
        match self.store.put(name, record.clone()).await {
            Ok(()) => {
                view.insert(record);
                self.report.merged += 1;
                Ok(true)
            }
            Err(e) if is_fatal(&e) => Err(e),
            Err(e) => {
                debug!(collection = %name, id = %record.id, error = %e, "imported record failed to write");
                self.report.skipped += 1;
                Ok(false)
            }
        }
    }

    /// Remove a local record that lost its date/week to an import.
    async fn displace(&mut self, name: &str, view: &mut LocalView, id: &str) -> StoreResult<()> {
        match self.store.remove(name, id).await {
            Ok(()) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => warn!(collection = %name, id = %id, error = %e, "failed to remove displaced record"),
        }
        view.remove(id);
        Ok(())
    }

    async fn merge_tombstones(&mut self, tombstones: &[Value]) -> StoreResult<()> {
        for value in tombstones {
            let tombstone = match Tombstone::from_value(value.clone()) {
                Ok(tombstone) => tombstone,
                Err(e) => {
                    debug!(error = %e, "skipping malformed tombstone");
                    self.report.skipped += 1;
                    continue;
                }
            };
            self.merge_tombstone(tombstone).await?;
        }
        Ok(())
    }

    async fn merge_tombstone(&mut self, tombstone: Tombstone) -> StoreResult<()> {
        let live = match self.store.get(&tombstone.store, &tombstone.id).await {
            Ok(live) => live,
            Err(e) if is_fatal(&e) => return Err(e),
            Err(_) => None,
        };

        if !tombstone.supersedes(live.as_ref()) {
            debug!(store = %tombstone.store, id = %tombstone.id, "live record newer than tombstone");
            self.report.skipped += 1;
            return Ok(());
        }

        // A stored tombstone at least as new as this one stays in place.
        let stored = match self.store.get(DELETED_COLLECTION, &tombstone.id).await {
            Ok(stored) => stored.as_ref().and_then(Tombstone::from_record),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(_) => None,
        };
        let keep_stored = stored
            .is_some_and(|stored| stored.deleted_millis() >= tombstone.deleted_millis());
        if keep_stored && live.is_none() {
            debug!(id = %tombstone.id, "stored tombstone is as new or newer");
            self.report.skipped += 1;
            return Ok(());
        }

        if !keep_stored {
            match self.store.put(DELETED_COLLECTION, tombstone.to_record()).await {
                Ok(()) => {}
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    debug!(id = %tombstone.id, error = %e, "tombstone failed to write");
                    self.report.skipped += 1;
                    return Ok(());
                }
            }
        }

        if live.is_some() {
            match self.store.remove(&tombstone.store, &tombstone.id).await {
                Ok(()) => {}
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => debug!(store = %tombstone.store, id = %tombstone.id, error = %e, "tombstoned record already gone"),
            }
        }
        self.report.merged += 1;
        Ok(())
    }

    fn log(&mut self, collection: &str, id: &str, resolution: Resolution) {
        debug!(collection = %collection, id = %id, resolution = %resolution, "conflict resolved");
        self.report.conflicts.push(Conflict {
            collection: collection.to_string(),
            id: id.to_string(),
            resolution,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::default()
    }

    fn store() -> MemoryStore {
        MemoryStore::with_device_id(&catalog(), "dev-A")
    }

    fn data(collection: &str, records: Vec<Value>) -> SnapshotData {
        let mut data = SnapshotData::default();
        data.collections.insert(collection.into(), records);
        data
    }

    async fn merge(store: &MemoryStore, data: &SnapshotData) -> MergeReport {
        let catalog = catalog();
        MergeResolver::new(store, &catalog)
            .merge(data)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn inserts_new_records() {
        let store = store();
        let report = merge(
            &store,
            &data("goals", vec![json!({"id": "g1", "title": "Learn Rust"})]),
        )
        .await;

        assert_eq!(report.merged, 1);
        assert_eq!(report.skipped, 0);
        assert!(report.conflicts.is_empty());
        assert!(store.get("goals", "g1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn newer_import_overwrites() {
        let store = store();
        store
            .put(
                "goals",
                Record::new("g1").with_updated_at("2026-01-01T00:00Z"),
            )
            .await
            .unwrap();

        let report = merge(
            &store,
            &data(
                "goals",
                vec![json!({"id": "g1", "updatedAt": "2026-01-02T00:00Z", "title": "new"})],
            ),
        )
        .await;

        assert_eq!(report.merged, 1);
        assert_eq!(report.conflicts[0].resolution, Resolution::Imported);
        let record = store.get("goals", "g1").await.unwrap().unwrap();
        assert_eq!(record.fields["title"], json!("new"));
    }

    #[tokio::test]
    async fn tie_keeps_local() {
        let store = store();
        let local = Record::new("g1")
            .with_updated_at("2026-01-01T00:00Z")
            .with_field("title", json!("local"));
        store.put("goals", local.clone()).await.unwrap();

        let report = merge(
            &store,
            &data(
                "goals",
                vec![json!({"id": "g1", "updatedAt": "2026-01-01T00:00Z", "title": "imported"})],
            ),
        )
        .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.conflicts[0].resolution, Resolution::Kept);
        assert_eq!(store.get("goals", "g1").await.unwrap(), Some(local));
    }

    #[tokio::test]
    async fn missing_timestamp_loses_to_any_timestamp() {
        let store = store();
        store
            .put("goals", Record::new("g1").with_updated_at(1))
            .await
            .unwrap();

        let report = merge(&store, &data("goals", vec![json!({"id": "g1"})])).await;
        assert_eq!(report.conflicts[0].resolution, Resolution::Kept);
    }

    #[tokio::test]
    async fn date_clash_newer_import_replaces() {
        let store = store();
        store
            .put(
                "hours",
                Record::new("h1")
                    .with_date("2026-02-10")
                    .with_updated_at("2026-02-10T08:00Z"),
            )
            .await
            .unwrap();

        let report = merge(
            &store,
            &data(
                "hours",
                vec![json!({"id": "h2", "date": "2026-02-10", "updatedAt": "2026-02-11T09:00Z"})],
            ),
        )
        .await;

        assert_eq!(report.merged, 1);
        assert_eq!(
            report.conflicts[0].resolution,
            Resolution::ImportedReplacesByDate
        );
        let hours = store.list_all("hours").await.unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].id, "h2");
    }

    #[tokio::test]
    async fn date_clash_older_import_is_discarded() {
        let store = store();
        store
            .put(
                "hours",
                Record::new("h1")
                    .with_date("2026-02-10")
                    .with_updated_at("2026-02-12T08:00Z"),
            )
            .await
            .unwrap();

        let report = merge(
            &store,
            &data(
                "hours",
                vec![json!({"id": "h2", "date": "2026-02-10", "updatedAt": "2026-02-11T09:00Z"})],
            ),
        )
        .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.conflicts[0].resolution, Resolution::KeptExistingNewer);
        let hours = store.list_all("hours").await.unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].id, "h1");
    }

    #[tokio::test]
    async fn date_clash_tie_keeps_local() {
        let store = store();
        store
            .put(
                "hours",
                Record::new("h1")
                    .with_date("2026-02-10")
                    .with_updated_at("2026-02-11T09:00Z"),
            )
            .await
            .unwrap();

        let report = merge(
            &store,
            &data(
                "hours",
                vec![json!({"id": "h2", "date": "2026-02-10", "updatedAt": "2026-02-11T09:00:00Z"})],
            ),
        )
        .await;

        assert_eq!(report.merged, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.conflicts[0].resolution, Resolution::KeptExistingNewer);
        assert!(store.get("hours", "h1").await.unwrap().is_some());
        assert!(store.get("hours", "h2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn week_clash_is_logged_by_week() {
        let store = store();
        store
            .put(
                "reflections",
                Record::new("r1").with_week("2026-W07").with_updated_at(100),
            )
            .await
            .unwrap();

        let report = merge(
            &store,
            &data(
                "reflections",
                vec![json!({"id": "r2", "week": "2026-W07", "updatedAt": 200})],
            ),
        )
        .await;

        assert_eq!(
            report.conflicts[0].resolution,
            Resolution::ImportedReplacesByWeek
        );
        assert_eq!(store.count("reflections").await, 1);
    }

    #[tokio::test]
    async fn uniqueness_view_tracks_imports_within_a_collection() {
        let store = store();

        // Two imported records for the same date: the second must see the first.
        let report = merge(
            &store,
            &data(
                "hours",
                vec![
                    json!({"id": "h1", "date": "2026-03-01", "updatedAt": 100}),
                    json!({"id": "h2", "date": "2026-03-01", "updatedAt": 200}),
                    json!({"id": "h3", "date": "2026-03-01", "updatedAt": 150}),
                ],
            ),
        )
        .await;

        assert_eq!(report.merged, 2);
        assert_eq!(report.skipped, 1);
        let hours = store.list_all("hours").await.unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].id, "h2");
    }

    #[tokio::test]
    async fn same_id_moving_onto_a_newer_date_slot_is_kept_out() {
        let store = store();
        store
            .put(
                "hours",
                Record::new("h1").with_date("2026-03-01").with_updated_at(100),
            )
            .await
            .unwrap();
        store
            .put(
                "hours",
                Record::new("h2").with_date("2026-03-02").with_updated_at(500),
            )
            .await
            .unwrap();

        // h1 edited to 2026-03-02 at 300, but h2 owns that date and is newer.
        let report = merge(
            &store,
            &data(
                "hours",
                vec![json!({"id": "h1", "date": "2026-03-02", "updatedAt": 300})],
            ),
        )
        .await;

        assert_eq!(report.conflicts[0].resolution, Resolution::KeptExistingNewer);
        assert_eq!(store.count("hours").await, 2);
    }

    #[tokio::test]
    async fn settings_never_import_device_identity() {
        let store = store();
        store.put_setting("theme", json!("dark")).await.unwrap();

        let mut data = SnapshotData::default();
        data.settings.insert("theme".into(), json!("light"));
        data.settings.insert(DEVICE_ID_KEY.into(), json!("dev-B"));

        let report = merge(&store, &data).await;
        assert_eq!(report.merged, 1);

        let settings = store.settings().await.unwrap();
        assert_eq!(settings["theme"], json!("light"));
        assert_eq!(settings[DEVICE_ID_KEY], json!("dev-A"));
    }

    #[tokio::test]
    async fn malformed_and_unwritable_records_are_skipped() {
        let store = store();
        let mut data = data("goals", vec![json!({"title": "no id"}), json!({"id": ""})]);
        data.collections
            .insert("unknown".into(), vec![json!({"id": "u1"})]);

        let report = merge(&store, &data).await;
        assert_eq!(report.merged, 0);
        assert_eq!(report.skipped, 3);
    }

    #[tokio::test]
    async fn tombstone_precedence() {
        let store = store();
        store
            .put(
                "logbook",
                Record::new("t1").with_updated_at("2026-02-11T10:00Z"),
            )
            .await
            .unwrap();
        store
            .put(
                "logbook",
                Record::new("t2").with_updated_at("2026-02-13T10:00Z"),
            )
            .await
            .unwrap();

        let report = merge(
            &store,
            &data(
                DELETED_COLLECTION,
                vec![
                    json!({"id": "t1", "store": "logbook", "deletedAt": "2026-02-12T10:00Z"}),
                    json!({"id": "t2", "store": "logbook", "deletedAt": "2026-02-12T10:00Z"}),
                ],
            ),
        )
        .await;

        assert_eq!(report.merged, 1);
        assert_eq!(report.skipped, 1);
        assert!(store.get("logbook", "t1").await.unwrap().is_none());
        assert!(store.get("logbook", "t2").await.unwrap().is_some());
        assert!(store.get(DELETED_COLLECTION, "t1").await.unwrap().is_some());
        assert!(store.get(DELETED_COLLECTION, "t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tombstones_apply_after_records() {
        let store = store();
        let mut data = data(
            "logbook",
            vec![json!({"id": "t1", "updatedAt": "2026-02-11T10:00Z"})],
        );
        data.collections.insert(
            DELETED_COLLECTION.into(),
            vec![json!({"id": "t1", "store": "logbook", "deletedAt": "2026-02-12T10:00Z"})],
        );

        merge(&store, &data).await;
        assert!(store.get("logbook", "t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reapplying_a_tombstone_is_a_no_op() {
        let store = store();
        let data = data(
            DELETED_COLLECTION,
            vec![json!({"id": "t1", "store": "logbook", "deletedAt": "2026-02-12T10:00Z"})],
        );

        assert_eq!(merge(&store, &data).await.merged, 1);
        let second = merge(&store, &data).await;
        assert_eq!(second.merged, 0);
        assert_eq!(second.skipped, 1);
    }

    #[tokio::test]
    async fn older_tombstone_does_not_replace_newer_one() {
        let store = store();
        let newer = Tombstone {
            id: "t1".into(),
            store: "logbook".into(),
            deleted_at: Some("2026-02-20T10:00Z".into()),
        };
        store
            .put(DELETED_COLLECTION, newer.to_record())
            .await
            .unwrap();

        let report = merge(
            &store,
            &data(
                DELETED_COLLECTION,
                vec![json!({"id": "t1", "store": "logbook", "deletedAt": "2026-02-12T10:00Z"})],
            ),
        )
        .await;

        assert_eq!(report.merged, 0);
        assert_eq!(report.skipped, 1);
        let stored = store
            .get(DELETED_COLLECTION, "t1")
            .await
            .unwrap()
            .and_then(|r| Tombstone::from_record(&r));
        assert_eq!(stored, Some(newer));
    }

    #[test]
    fn resolution_labels() {
        assert_eq!(Resolution::Imported.to_string(), "imported");
        assert_eq!(
            Resolution::ImportedReplacesByWeek.to_string(),
            "imported replaces by week"
        );
        assert_eq!(
            Resolution::KeptExistingNewer.to_string(),
            "kept, existing newer"
        );
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn block_on<F: std::future::Future>(future: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(future)
        }

        proptest! {
            #[test]
            fn prop_recency_wins_regardless_of_side(
                a_time in 0i64..10_000,
                b_time in 0i64..10_000,
            ) {
                let a = json!({"id": "g1", "updatedAt": a_time, "title": "a"});
                let b = json!({"id": "g1", "updatedAt": b_time, "title": "b"});

                let (a_local, b_local) = block_on(async {
                    let first = store();
                    first.put("goals", Record::from_value(a.clone()).unwrap()).await.unwrap();
                    merge(&first, &data("goals", vec![b.clone()])).await;

                    let second = store();
                    second.put("goals", Record::from_value(b.clone()).unwrap()).await.unwrap();
                    merge(&second, &data("goals", vec![a.clone()])).await;

                    (
                        first.get("goals", "g1").await.unwrap().unwrap(),
                        second.get("goals", "g1").await.unwrap().unwrap(),
                    )
                });

                if a_time != b_time {
                    let expected = if a_time > b_time { "a" } else { "b" };
                    prop_assert_eq!(&a_local.fields["title"], &json!(expected));
                    prop_assert_eq!(&b_local.fields["title"], &json!(expected));
                }
            }

            #[test]
            fn prop_merge_is_idempotent(
                times in proptest::collection::vec(0i64..1_000, 1..12),
            ) {
                let records: Vec<Value> = times
                    .iter()
                    .enumerate()
                    .map(|(i, t)| json!({
                        "id": format!("h{i}"),
                        "date": format!("2026-03-{:02}", (i % 4) + 1),
                        "updatedAt": t,
                    }))
                    .collect();
                let imported = data("hours", records);

                let (before, after, second) = block_on(async {
                    let store = store();
                    merge(&store, &imported).await;
                    let before = store.dump().await;
                    let second = merge(&store, &imported).await;
                    (before, store.dump().await, second)
                });

                prop_assert_eq!(second.merged, 0);
                prop_assert_eq!(before, after);
            }

            #[test]
            fn prop_at_most_one_record_per_date(
                times in proptest::collection::vec(0i64..1_000, 1..16),
            ) {
                let records: Vec<Value> = times
                    .iter()
                    .enumerate()
                    .map(|(i, t)| json!({
                        "id": format!("h{i}"),
                        "date": format!("2026-03-{:02}", (i % 3) + 1),
                        "updatedAt": t,
                    }))
                    .collect();

                let hours = block_on(async {
                    let store = store();
                    merge(&store, &data("hours", records)).await;
                    store.list_all("hours").await.unwrap()
                });

                let mut dates: Vec<_> = hours.iter().filter_map(|r| r.date.clone()).collect();
                let total = dates.len();
                dates.sort();
                dates.dedup();
                prop_assert_eq!(dates.len(), total);
            }
        }
    }
}
