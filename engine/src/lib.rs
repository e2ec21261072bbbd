//! # Worklog Sync
//!
//! Encrypted snapshot export, import and merge for a local-first worklog.
//!
//! A device's whole dataset is captured as a [`Snapshot`], encrypted into a
//! portable container by a [`Cipher`], carried to another device by hand, and
//! there either substituted for the local data or merged into it record by
//! record. Every import is preceded by a safety snapshot so it can be undone.
//!
//! ## Design Principles
//!
//! - **Collaborators behind traits**: storage is a [`RecordStore`], encryption
//!   is a [`Cipher`]; the engine only sequences them
//! - **Fail closed before mutating**: decryption, format and version errors
//!   are raised before anything is written
//! - **Tolerant while applying**: a malformed or unwritable record is skipped
//!   and counted, never fatal
//! - **Deterministic merges**: collections are visited in name order and
//!   conflicts are resolved by recency alone
//!
//! ## Core Concepts
//!
//! ### Records and collections
//!
//! A [`Record`] has an `id`, optional `updatedAt`, `date` and `week`, and any
//! other fields. The [`Catalog`] names the collections taking part in sync and
//! gives each a [`CollectionPolicy`]:
//! - [`CollectionPolicy::Plain`] - records are independent
//! - [`CollectionPolicy::UniqueDate`] - at most one record per `date`
//! - [`CollectionPolicy::UniqueWeek`] - at most one record per `week`
//!
//! Deletions are [`Tombstone`]s in the reserved `deleted` collection.
//!
//! ### Merge
//!
//! The [`MergeResolver`] keeps whichever side was updated more recently (ties
//! keep the local record) and collapses records that collide on a unique
//! field to the newer one. Non-trivial decisions are reported as
//! [`Conflict`]s.
//!
//! ## Quick Start
//!
//! ```rust
//! use worklog_sync::{
//!     Catalog, KdfParams, MemoryStore, PassphraseCipher, Record, RecordStore,
//!     SyncConfig, SyncEngine,
//! };
//!
//! # fn main() {
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let catalog = Catalog::default();
//! let laptop = SyncEngine::new(
//!     MemoryStore::new(&catalog),
//!     PassphraseCipher::new(KdfParams::insecure_fast()),
//!     catalog.clone(),
//!     SyncConfig::default(),
//! );
//! laptop
//!     .store()
//!     .put("hours", Record::new("h1").with_date("2026-02-10"))
//!     .await
//!     .unwrap();
//!
//! // Export on one device...
//! let container = laptop.export_container("correct horse", false).await.unwrap();
//!
//! // ...validate and merge on another.
//! let phone = SyncEngine::new(
//!     MemoryStore::new(&catalog),
//!     PassphraseCipher::new(KdfParams::insecure_fast()),
//!     catalog,
//!     SyncConfig::default(),
//! );
//! let snapshot = phone.validate_container(&container, "correct horse").await.unwrap();
//! let outcome = phone.apply_merge(&snapshot.data).await.unwrap();
//! assert_eq!(outcome.merged, 1);
//!
//! // Changed our mind.
//! phone.undo_import(&outcome.safety_snapshot).await.unwrap();
//! assert!(phone.store().list_all("hours").await.unwrap().is_empty());
//! # });
//! # }
//! ```
//!
//! ## Sessions
//!
//! [`ImportSession`] wraps validation, application, undo and confirmation in
//! a state machine that rejects out-of-order calls.

pub mod cipher;
pub mod config;
pub mod engine;
pub mod error;
pub mod merge;
pub mod policy;
pub mod record;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod timestamp;

// Re-export main types at crate root
pub use cipher::{Cipher, PassphraseCipher};
pub use config::{KdfParams, SyncConfig, DEFAULT_CONTAINER_EXTENSION};
pub use engine::{MergeOutcome, ReplaceOutcome, RestoreReport, SyncEngine};
pub use error::{CipherError, Error, StoreError};
pub use merge::{Conflict, MergeReport, MergeResolver, Resolution};
pub use policy::{
    Catalog, CollectionPolicy, CollectionSpec, DELETED_COLLECTION, DEVICE_ID_KEY,
    LOCAL_SCHEMA_VERSION, SETTINGS_COLLECTION,
};
pub use record::{Record, Tombstone};
pub use session::{ImportMode, ImportOutcome, ImportSession};
pub use snapshot::{Snapshot, SnapshotData, SnapshotMeta, SnapshotSummary};
pub use store::{MemoryStore, RecordStore, StoreDump};
pub use timestamp::Stamp;

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
pub type DeviceId = String;
pub type SchemaVersion = u32;
/// Milliseconds since the Unix epoch
pub type Timestamp = i64;
