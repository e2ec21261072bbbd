//! The caller-facing sync operations.
//!
//! [`SyncEngine`] ties a record store, a cipher and the collection catalog
//! together and exposes the export/import lifecycle:
//!
//! - [`SyncEngine::build_snapshot`] - read-only copy of the store
//! - [`SyncEngine::export_container`] - snapshot, serialized and encrypted
//! - [`SyncEngine::validate_container`] - decrypt and check, no mutation
//! - [`SyncEngine::apply_replace`] / [`SyncEngine::apply_merge`] - apply an
//!   import after capturing a safety snapshot
//! - [`SyncEngine::undo_import`] - restore a safety snapshot
//!
//! The safety snapshot is returned to the caller and never held here, so
//! independent import sessions cannot interfere.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StoreError};
use crate::merge::{Conflict, MergeReport, MergeResolver};
use crate::policy::DEVICE_ID_KEY;
use crate::snapshot::{Snapshot, SnapshotData, SnapshotMeta};
use crate::timestamp::{now_rfc3339, suggested_filename};
use crate::{Catalog, Cipher, Error, Record, RecordStore, SyncConfig};

/// Result of a Replace import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceOutcome {
    /// Pre-import state, the only way back
    pub safety_snapshot: Snapshot,
    /// Records and settings written
    pub written: usize,
    /// Records that were malformed or failed to write
    pub skipped: usize,
}

/// Result of a Merge import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    /// Pre-import state, the only way back
    pub safety_snapshot: Snapshot,
    pub merged: usize,
    pub skipped: usize,
    pub conflicts: Vec<Conflict>,
}

/// Result of writing a full dataset back into a cleared store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub written: usize,
    pub skipped: usize,
}

/// Snapshot export, import and merge over a record store.
#[derive(Debug)]
pub struct SyncEngine<S, C> {
    store: S,
    cipher: C,
    catalog: Catalog,
    config: SyncConfig,
}

impl<S: RecordStore, C: Cipher> SyncEngine<S, C> {
    /// Create an engine.
    pub fn new(store: S, cipher: C, catalog: Catalog, config: SyncConfig) -> Self {
        Self {
            store,
            cipher,
            catalog,
            config,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The collection catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Capture every participating collection and the settings.
    ///
    /// Never fails: an unreadable collection is captured as empty.
    #[instrument(skip(self))]
    pub async fn build_snapshot(&self, include_sensitive: bool) -> Snapshot {
        let mut data = SnapshotData::default();

        for name in self.catalog.snapshot_collections(include_sensitive) {
            let records = match self.store.list_all(&name).await {
                Ok(records) => records.iter().map(Record::to_value).collect(),
                Err(e) => {
                    warn!(collection = %name, error = %e, "collection unreadable, captured as empty");
                    Vec::new()
                }
            };
            data.collections.insert(name, records);
        }

        let device_id = match self.store.settings().await {
            Ok(mut settings) => {
                let device_id = settings
                    .remove(DEVICE_ID_KEY)
                    .and_then(|v| v.as_str().map(str::to_string));
                data.settings = settings;
                device_id
            }
            Err(e) => {
                warn!(error = %e, "settings unreadable, captured as empty");
                None
            }
        };

        let snapshot = Snapshot {
            meta: SnapshotMeta {
                app_version: self.config.app_version.clone(),
                schema_version: self.catalog.version,
                device_id,
                exported_at: now_rfc3339(),
                store_counts: data.counts(),
            },
            data,
        };
        debug!(
            records = snapshot.data.record_count(),
            settings = snapshot.data.settings.len(),
            "snapshot built"
        );
        snapshot
    }

    /// Build a snapshot and encrypt it into a portable container.
    #[instrument(skip(self, password))]
    pub async fn export_container(&self, password: &str, include_sensitive: bool) -> Result<Vec<u8>> {
        let snapshot = self.build_snapshot(include_sensitive).await;
        let plaintext = snapshot.to_json()?;
        let container = self.cipher.encrypt(plaintext.as_bytes(), password).await?;

        info!(
            records = snapshot.data.record_count(),
            bytes = container.len(),
            "exported container"
        );
        Ok(container)
    }

    /// File name to offer when saving a container exported at `at`.
    pub fn suggested_filename(&self, at: NaiveDateTime) -> String {
        suggested_filename(at, &self.config.container_extension)
    }

    /// Decrypt a container and check its structure and schema version.
    ///
    /// Never touches the store, whatever the outcome.
    #[instrument(skip(self, container, password), fields(bytes = container.len()))]
    pub async fn validate_container(&self, container: &[u8], password: &str) -> Result<Snapshot> {
        let plaintext = self.cipher.decrypt(container, password).await?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| Error::Format("snapshot is not valid UTF-8".into()))?;
        let snapshot = Snapshot::from_json(&text)?;

        if snapshot.meta.schema_version > self.catalog.version {
            return Err(Error::UnsupportedSchemaVersion {
                imported: snapshot.meta.schema_version,
                local: self.catalog.version,
            });
        }

        info!(
            device = ?snapshot.meta.device_id,
            exported_at = %snapshot.meta.exported_at,
            records = snapshot.data.record_count(),
            "container validated"
        );
        Ok(snapshot)
    }

    /// Discard all local data and substitute the imported data.
    #[instrument(skip(self, imported))]
    pub async fn apply_replace(&self, imported: &SnapshotData) -> Result<ReplaceOutcome> {
        let safety_snapshot = self.build_snapshot(true).await;
        let report = self.restore(imported).await?;

        info!(
            written = report.written,
            skipped = report.skipped,
            "replace applied"
        );
        Ok(ReplaceOutcome {
            safety_snapshot,
            written: report.written,
            skipped: report.skipped,
        })
    }

    /// Reconcile the imported data with local data record by record.
    #[instrument(skip(self, imported))]
    pub async fn apply_merge(&self, imported: &SnapshotData) -> Result<MergeOutcome> {
        let safety_snapshot = self.build_snapshot(true).await;
        let MergeReport {
            merged,
            skipped,
            conflicts,
        } = MergeResolver::new(&self.store, &self.catalog)
            .merge(imported)
            .await?;

        info!(
            merged,
            skipped,
            conflicts = conflicts.len(),
            "merge applied"
        );
        Ok(MergeOutcome {
            safety_snapshot,
            merged,
            skipped,
            conflicts,
        })
    }

    /// Restore the state captured in a safety snapshot.
    ///
    /// A full restore: the store is cleared and refilled, nothing is diffed.
    #[instrument(skip(self, safety_snapshot))]
    pub async fn undo_import(&self, safety_snapshot: &Snapshot) -> Result<RestoreReport> {
        let report = self.restore(&safety_snapshot.data).await?;
        info!(
            written = report.written,
            skipped = report.skipped,
            "import undone"
        );
        Ok(report)
    }

    /// Clear the store and write a full dataset into it.
    async fn restore(&self, data: &SnapshotData) -> Result<RestoreReport> {
        self.store.clear_all().await?;

        let mut report = RestoreReport::default();
        self.write_settings(&data.settings, &mut report).await?;
        for (name, records) in &data.collections {
            self.write_records(name, records, &mut report).await?;
        }
        Ok(report)
    }

    async fn write_settings(
        &self,
        settings: &BTreeMap<String, Value>,
        report: &mut RestoreReport,
    ) -> Result<()> {
        for (key, value) in settings {
            if key == DEVICE_ID_KEY {
                continue;
            }
            match self.store.put_setting(key, value.clone()).await {
                Ok(()) => report.written += 1,
                Err(e @ StoreError::Unavailable(_)) => return Err(e.into()),
                Err(e) => {
                    warn!(key = %key, error = %e, "setting failed to write");
                    report.skipped += 1;
                }
            }
        }
        Ok(())
    }

    async fn write_records(
        &self,
        name: &str,
        records: &[Value],
        report: &mut RestoreReport,
    ) -> Result<()> {
        for value in records {
            let record = match Record::from_value(value.clone()) {
                Ok(record) => record,
                Err(e) => {
                    debug!(collection = %name, error = %e, "skipping malformed record");
                    report.skipped += 1;
                    continue;
                }
            };
            match self.store.put(name, record).await {
                Ok(()) => report.written += 1,
                Err(e @ StoreError::Unavailable(_)) => return Err(e.into()),
                Err(e) => {
                    debug!(collection = %name, error = %e, "record failed to write");
                    report.skipped += 1;
                }
            }
        }
        Ok(())
    }
}
