//! Import session state machine.
//!
//! ```text
//! Idle --validate--> Validated --apply--> Applied --undo----> Undone
//!   ^                                        |
//!   '--(validation or apply failure)         '--confirm--> Confirmed
//! ```
//!
//! The session owns the validated snapshot and, once applied, the safety
//! snapshot. Confirming drops the safety snapshot, after which the import
//! can no longer be undone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::engine::{MergeOutcome, ReplaceOutcome, RestoreReport, SyncEngine};
use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotSummary};
use crate::{Cipher, Error, RecordStore};

/// How validated data is applied to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Discard local data and substitute the imported data
    Replace,
    /// Reconcile record by record
    Merge,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Replace => write!(f, "replace"),
            ImportMode::Merge => write!(f, "merge"),
        }
    }
}

impl FromStr for ImportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(ImportMode::Replace),
            "merge" => Ok(ImportMode::Merge),
            other => Err(Error::Format(format!("unknown import mode '{other}'"))),
        }
    }
}

/// Outcome of applying an import in either mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ImportOutcome {
    Replace(ReplaceOutcome),
    Merge(MergeOutcome),
}

impl ImportOutcome {
    /// The pre-import state captured before applying.
    pub fn safety_snapshot(&self) -> &Snapshot {
        match self {
            ImportOutcome::Replace(outcome) => &outcome.safety_snapshot,
            ImportOutcome::Merge(outcome) => &outcome.safety_snapshot,
        }
    }

    /// Records and settings written.
    pub fn applied(&self) -> usize {
        match self {
            ImportOutcome::Replace(outcome) => outcome.written,
            ImportOutcome::Merge(outcome) => outcome.merged,
        }
    }

    /// Records skipped.
    pub fn skipped(&self) -> usize {
        match self {
            ImportOutcome::Replace(outcome) => outcome.skipped,
            ImportOutcome::Merge(outcome) => outcome.skipped,
        }
    }
}

#[derive(Debug, Clone, Default)]
enum State {
    #[default]
    Idle,
    Validated(Snapshot),
    Applied(ImportOutcome),
    Undone,
    Confirmed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Validated(_) => "validated",
            State::Applied(_) => "applied",
            State::Undone => "undone",
            State::Confirmed => "confirmed",
        }
    }
}

/// One import, from container to confirmation or undo.
#[derive(Debug, Clone, Default)]
pub struct ImportSession {
    state: State,
}

impl ImportSession {
    /// Start an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the current state.
    pub fn state(&self) -> &'static str {
        self.state.name()
    }

    /// The validated snapshot, until it is applied.
    pub fn validated(&self) -> Option<&Snapshot> {
        match &self.state {
            State::Validated(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Preview of the validated snapshot.
    pub fn preview(&self) -> Option<SnapshotSummary> {
        self.validated().map(Snapshot::summary)
    }

    /// The applied outcome, until it is undone or confirmed.
    pub fn outcome(&self) -> Option<&ImportOutcome> {
        match &self.state {
            State::Applied(outcome) => Some(outcome),
            _ => None,
        }
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    /// Decrypt and check a container. Allowed from `Idle` only.
    ///
    /// On failure the session stays `Idle`.
    pub async fn validate<S: RecordStore, C: Cipher>(
        &mut self,
        engine: &SyncEngine<S, C>,
        container: &[u8],
        password: &str,
    ) -> Result<SnapshotSummary> {
        if !matches!(self.state, State::Idle) {
            return Err(self.invalid("validate"));
        }
        let snapshot = engine.validate_container(container, password).await?;
        let summary = snapshot.summary();
        self.state = State::Validated(snapshot);
        Ok(summary)
    }

    /// Apply the validated snapshot. Allowed from `Validated` only.
    ///
    /// A fatal store error returns the session to `Idle`; the store may be
    /// partially written at that point.
    pub async fn apply<S: RecordStore, C: Cipher>(
        &mut self,
        engine: &SyncEngine<S, C>,
        mode: ImportMode,
    ) -> Result<&ImportOutcome> {
        let snapshot = match std::mem::take(&mut self.state) {
            State::Validated(snapshot) => snapshot,
            other => {
                self.state = other;
                return Err(self.invalid("apply"));
            }
        };

        let result = match mode {
            ImportMode::Replace => engine
                .apply_replace(&snapshot.data)
                .await
                .map(ImportOutcome::Replace),
            ImportMode::Merge => engine
                .apply_merge(&snapshot.data)
                .await
                .map(ImportOutcome::Merge),
        };

        let outcome = result.map_err(|e| {
            warn!(%mode, error = %e, "import failed");
            e
        })?;
        info!(
            %mode,
            applied = outcome.applied(),
            skipped = outcome.skipped(),
            "import applied"
        );
        self.state = State::Applied(outcome);
        self.outcome().ok_or_else(|| self.invalid("apply"))
    }

    /// Restore the safety snapshot. Allowed from `Applied` only.
    pub async fn undo<S: RecordStore, C: Cipher>(
        &mut self,
        engine: &SyncEngine<S, C>,
    ) -> Result<RestoreReport> {
        let State::Applied(outcome) = &self.state else {
            return Err(self.invalid("undo"));
        };
        let report = engine.undo_import(outcome.safety_snapshot()).await?;
        self.state = State::Undone;
        Ok(report)
    }

    /// Keep the import and drop the safety snapshot. Allowed from `Applied`
    /// only.
    pub fn confirm(&mut self) -> Result<()> {
        if !matches!(self.state, State::Applied(_)) {
            return Err(self.invalid("confirm"));
        }
        self.state = State::Confirmed;
        info!("import confirmed");
        Ok(())
    }
}
