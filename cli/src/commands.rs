//! Command implementations.
//!
//! Each command returns a serializable report; `main` decides how to print
//! it.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use worklog_sync::{
    Cipher, Conflict, ImportMode, ImportOutcome, ImportSession, RecordStore, RestoreReport,
    Snapshot, SnapshotSummary, StoreDump, SyncEngine,
};

use crate::error::{CliError, Result};

/// Result of `export`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub path: PathBuf,
    pub bytes: usize,
}

/// Result of `import`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub mode: ImportMode,
    pub source: SnapshotSummary,
    pub applied: usize,
    pub skipped: usize,
    pub conflicts: Vec<Conflict>,
    /// Where the safety snapshot was written, if anywhere
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_file: Option<PathBuf>,
}

/// Encrypt the store into a container file.
///
/// `out` may be a directory, in which case a timestamped file name is chosen.
pub async fn export<S: RecordStore, C: Cipher>(
    engine: &SyncEngine<S, C>,
    password: &str,
    out: &Path,
    include_sensitive: bool,
    now: NaiveDateTime,
) -> Result<ExportReport> {
    let container = engine.export_container(password, include_sensitive).await?;
    let path = if fs::metadata(out).await.map(|m| m.is_dir()).unwrap_or(false) {
        out.join(engine.suggested_filename(now))
    } else {
        out.to_path_buf()
    };

    fs::write(&path, &container)
        .await
        .map_err(CliError::file(&path))?;
    Ok(ExportReport {
        path,
        bytes: container.len(),
    })
}

/// Decrypt and validate a container without touching the store.
pub async fn inspect<S: RecordStore, C: Cipher>(
    engine: &SyncEngine<S, C>,
    password: &str,
    file: &Path,
) -> Result<SnapshotSummary> {
    let container = fs::read(file).await.map_err(CliError::file(file))?;
    let snapshot = engine.validate_container(&container, password).await?;
    Ok(snapshot.summary())
}

/// Validate a container and apply it.
///
/// With `undo_file` the safety snapshot is written there before the import
/// is confirmed, so `undo` can restore it later. The file is created before
/// anything is applied; if it cannot be, the store is left untouched.
pub async fn import<S: RecordStore, C: Cipher>(
    engine: &SyncEngine<S, C>,
    password: &str,
    file: &Path,
    mode: ImportMode,
    undo_file: Option<&Path>,
) -> Result<ImportReport> {
    let container = fs::read(file).await.map_err(CliError::file(file))?;

    let mut session = ImportSession::new();
    let source = session.validate(engine, &container, password).await?;
    if let Some(path) = undo_file {
        fs::write(path, b"").await.map_err(CliError::file(path))?;
    }
    let outcome = session.apply(engine, mode).await?;

    let conflicts = match outcome {
        ImportOutcome::Merge(merge) => merge.conflicts.clone(),
        ImportOutcome::Replace(_) => Vec::new(),
    };
    let (applied, skipped) = (outcome.applied(), outcome.skipped());

    if let Some(path) = undo_file {
        let json = outcome.safety_snapshot().to_json_pretty()?;
        fs::write(path, json).await.map_err(CliError::file(path))?;
        tracing::info!(path = %path.display(), "safety snapshot written");
    }
    session.confirm()?;

    Ok(ImportReport {
        mode,
        source,
        applied,
        skipped,
        conflicts,
        undo_file: undo_file.map(Path::to_path_buf),
    })
}

/// Restore a safety snapshot written by `import --undo-file`.
pub async fn undo<S: RecordStore, C: Cipher>(
    engine: &SyncEngine<S, C>,
    from: &Path,
) -> Result<RestoreReport> {
    let json = fs::read_to_string(from)
        .await
        .map_err(CliError::file(from))?;
    let snapshot = Snapshot::from_json(&json)?;
    Ok(engine.undo_import(&snapshot).await?)
}

/// Everything the store holds, device id included.
pub async fn dump<S: RecordStore, C: Cipher>(engine: &SyncEngine<S, C>) -> Result<StoreDump> {
    let collections = engine.catalog().store_collections();
    Ok(StoreDump::capture(engine.store(), &collections).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_store::JsonDirStore;
    use serde_json::json;
    use worklog_sync::{Catalog, KdfParams, PassphraseCipher, Record, SyncConfig};

    async fn engine(dir: &Path) -> SyncEngine<JsonDirStore, PassphraseCipher> {
        let catalog = Catalog::default();
        let store = JsonDirStore::open(dir, &catalog).await.unwrap();
        SyncEngine::new(
            store,
            PassphraseCipher::new(KdfParams::insecure_fast()),
            catalog,
            SyncConfig::default(),
        )
    }

    fn noon() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 2, 10)
            .unwrap()
            .and_hms_opt(12, 5, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn export_into_directory_uses_suggested_name() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let engine = engine(data.path()).await;

        let report = export(&engine, "pw", out.path(), false, noon()).await.unwrap();
        assert_eq!(report.path, out.path().join("Sync_2026-02-10_1205.wlsync"));
        assert_eq!(
            std::fs::metadata(&report.path).unwrap().len() as usize,
            report.bytes
        );
    }

    #[tokio::test]
    async fn import_with_undo_file_then_undo() {
        let laptop_dir = tempfile::tempdir().unwrap();
        let phone_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let laptop = engine(laptop_dir.path()).await;
        let phone = engine(phone_dir.path()).await;

        laptop
            .store()
            .put(
                "hours",
                Record::new("h2")
                    .with_date("2026-02-10")
                    .with_updated_at("2026-02-11T09:00Z"),
            )
            .await
            .unwrap();
        phone
            .store()
            .put(
                "hours",
                Record::new("h1")
                    .with_date("2026-02-10")
                    .with_updated_at("2026-02-10T08:00Z"),
            )
            .await
            .unwrap();
        phone.store().put_setting("theme", json!("dark")).await.unwrap();
        let before = dump(&phone).await.unwrap();

        let container = work.path().join("laptop.wlsync");
        export(&laptop, "pw", &container, false, noon()).await.unwrap();

        let summary = inspect(&phone, "pw", &container).await.unwrap();
        assert_eq!(summary.record_counts["hours"], 1);
        assert_eq!(dump(&phone).await.unwrap(), before);

        let undo_file = work.path().join("undo.json");
        let report = import(
            &phone,
            "pw",
            &container,
            ImportMode::Merge,
            Some(undo_file.as_path()),
        )
        .await
        .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.conflicts.len(), 1);
        let hours = phone.store().list_all("hours").await.unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].id, "h2");

        undo(&phone, &undo_file).await.unwrap();
        assert_eq!(dump(&phone).await.unwrap(), before);
    }

    #[tokio::test]
    async fn wrong_password_import_changes_nothing() {
        let data = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let engine = engine(data.path()).await;
        engine.store().put("goals", Record::new("g1")).await.unwrap();
        let before = dump(&engine).await.unwrap();

        let container = work.path().join("c.wlsync");
        export(&engine, "right", &container, false, noon()).await.unwrap();

        let result = import(&engine, "wrong", &container, ImportMode::Replace, None).await;
        assert!(matches!(result, Err(CliError::Engine(_))));
        assert_eq!(dump(&engine).await.unwrap(), before);
    }

    #[tokio::test]
    async fn unwritable_undo_file_stops_import_before_apply() {
        let data = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let engine = engine(data.path()).await;

        let container = work.path().join("empty.wlsync");
        export(&engine, "pw", &container, false, noon()).await.unwrap();
        engine.store().put("goals", Record::new("g1")).await.unwrap();
        let before = dump(&engine).await.unwrap();

        let undo_file = work.path().join("missing-dir").join("undo.json");
        let result = import(
            &engine,
            "pw",
            &container,
            ImportMode::Replace,
            Some(undo_file.as_path()),
        )
        .await;

        match result {
            Err(CliError::File { path, .. }) => assert_eq!(path, undo_file),
            other => panic!("expected file error, got {other:?}"),
        }
        assert_eq!(dump(&engine).await.unwrap(), before);
        assert!(engine.store().get("goals", "g1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_container_names_the_path() {
        let data = tempfile::tempdir().unwrap();
        let engine = engine(data.path()).await;
        let missing = data.path().join("nope.wlsync");

        match inspect(&engine, "pw", &missing).await {
            Err(CliError::File { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected file error, got {other:?}"),
        }
    }
}
