//! Run History & Rollback Manager
//!
//! Every generation pass that changed the filesystem is recorded as a run:
//! a manifest of its write outcomes plus a backup of every file it
//! overwrote. Runs move through `pending → persisted → rolled_back`; a run
//! is pending only while its backups are being written and becomes visible
//! once its manifest lands.
//!
//! ## Components
//! - [`RunHistory`]: records runs and answers list / get / latest queries
//! - [`RunStore`]: storage seam, [`FsRunStore`] on disk, [`MemoryRunStore`] for tests
//! - [`rollback`]: reverts runs selected by id, execution group or recency

pub mod rollback;
pub mod store;

pub use rollback::{
    RollbackAction, RollbackEntry, RollbackOptions, RollbackReport, RollbackSelection,
    RollbackSummary,
};
pub use store::{FsRunStore, MemoryRunStore, RunStore};

use crate::error::Result;
use crate::logging::run_span;
use crate::utils::{backup_file_name, make_short_random_id};
use crate::writer::{WriteOptions, WriteOutcome, WriteStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::Display;

// =============================================================================
// Type Definitions
// =============================================================================

/// Where the generated artifacts came from (module / entity / source file)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub module: String,
    pub entity: String,
    pub source_path: String,
}

impl SourceIdentity {
    pub fn new(
        module: impl Into<String>,
        entity: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            entity: entity.into(),
            source_path: source_path.into(),
        }
    }
}

/// One recorded write outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    pub path: String,
    pub absolute_path: PathBuf,
    pub status: WriteStatus,
    pub size: u64,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_size: Option<u64>,
    /// Backup file name inside the run directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Persisted `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub blueprint: SourceIdentity,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub options: WriteOptions,
    pub entries: Vec<RunEntry>,
}

/// Persisted `rolled_back.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackMarker {
    pub rolled_back_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Persisted,
    RolledBack,
}

/// A persisted run as read back from its store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRun {
    #[serde(flatten)]
    pub manifest: RunManifest,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// Run directory, for disk-backed stores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl GenerationRun {
    pub fn new(manifest: RunManifest, marker: Option<RollbackMarker>, directory: Option<PathBuf>) -> Self {
        let rolled_back_at = marker.map(|m| m.rolled_back_at);
        Self {
            manifest,
            state: if rolled_back_at.is_some() {
                RunState::RolledBack
            } else {
                RunState::Persisted
            },
            rolled_back_at,
            directory,
        }
    }

    pub fn id(&self) -> &str {
        &self.manifest.run_id
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.manifest.execution_id.as_deref()
    }

    pub fn is_rolled_back(&self) -> bool {
        self.state == RunState::RolledBack
    }

    /// Entries a rollback acts on
    pub fn changes(&self) -> impl Iterator<Item = &RunEntry> {
        self.manifest.entries.iter().filter(|e| e.status.is_change())
    }
}

/// Caller-supplied context for [`RunHistory::record`]
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    pub execution_id: Option<String>,
    pub options: WriteOptions,
}

// =============================================================================
// RunHistory
// =============================================================================

pub struct RunHistory<S: RunStore> {
    store: S,
    enabled: bool,
}

impl<S: RunStore> RunHistory<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            enabled: true,
        }
    }

    /// History can be switched off administratively; `record` then persists nothing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a pass. Returns the new run id, or `None` when history is
    /// disabled or nothing was written or overwritten.
    ///
    /// Backups are written before the manifest, so a persisted manifest
    /// never references a backup that does not exist.
    pub fn record(
        &self,
        source: &SourceIdentity,
        outcomes: &[WriteOutcome],
        context: &RecordContext,
    ) -> Result<Option<String>> {
        if !self.enabled {
            tracing::debug!("run history disabled; not recording");
            return Ok(None);
        }
        if !outcomes.iter().any(|o| o.status.is_change()) {
            tracing::debug!(outcomes = outcomes.len(), "no filesystem changes; not recording");
            return Ok(None);
        }

        let timestamp = Utc::now();
        let run_id = new_run_id(timestamp);
        let _span = run_span(&run_id).entered();
        self.store.create(&run_id)?;

        let mut entries = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes.iter().enumerate() {
            let backup = match (&outcome.status, outcome.previous_content()) {
                (WriteStatus::Overwritten, Some(previous)) => {
                    let name = backup_file_name(index, &outcome.relative_path);
                    self.store.write_backup(&run_id, &name, previous)?;
                    Some(name)
                }
                (WriteStatus::Overwritten, None) => {
                    tracing::warn!(
                        path = %outcome.relative_path,
                        "overwritten outcome carries no previous content; no backup taken"
                    );
                    None
                }
                _ => None,
            };

            entries.push(RunEntry {
                path: outcome.relative_path.clone(),
                absolute_path: outcome.absolute_path.clone(),
                status: outcome.status,
                size: outcome.byte_size,
                hash: outcome.content_hash.clone(),
                previous_hash: outcome.previous_content_hash().map(str::to_string),
                previous_size: outcome.previous_byte_size(),
                backup,
                message: outcome.message.clone(),
            });
        }

        let manifest = RunManifest {
            run_id: run_id.clone(),
            execution_id: context.execution_id.clone(),
            blueprint: source.clone(),
            timestamp,
            options: context.options,
            entries,
        };
        self.store.save_manifest(&manifest)?;

        tracing::info!(
            run_id = %run_id,
            execution_id = ?context.execution_id,
            entries = manifest.entries.len(),
            source = %source.source_path,
            "generation run recorded"
        );
        Ok(Some(run_id))
    }

    /// All runs, newest first
    pub fn list_runs(&self) -> Result<Vec<GenerationRun>> {
        let mut runs = Vec::new();
        for id in self.store.list_ids()? {
            match self.store.load(&id) {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(run_id = %id, error = %err, "skipping unreadable run");
                }
            }
        }
        runs.sort_by(|a, b| {
            b.manifest
                .timestamp
                .cmp(&a.manifest.timestamp)
                .then_with(|| b.id().cmp(a.id()))
        });
        Ok(runs)
    }

    pub fn get_run(&self, id: &str) -> Result<Option<GenerationRun>> {
        self.store.load(id)
    }

    pub fn get_latest_run(&self) -> Result<Option<GenerationRun>> {
        Ok(self.list_runs()?.into_iter().next())
    }
}

/// Sortable id: UTC timestamp to the millisecond plus a short random tail
fn new_run_id(at: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        at.format("%Y%m%dT%H%M%S%3fZ"),
        make_short_random_id("", 6)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ArtifactWriter, GeneratedArtifact};
    use tempfile::TempDir;

    fn source() -> SourceIdentity {
        SourceIdentity::new("Blog", "Post", "blueprints/post.yaml")
    }

    #[test]
    fn test_no_changes_records_nothing() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path());
        let history = RunHistory::new(MemoryRunStore::new());
        let preview = writer.write(
            &GeneratedArtifact::new("a.txt", "x"),
            WriteOptions {
                dry_run: true,
                force: false,
            },
        );

        let run_id = history
            .record(&source(), &[preview], &RecordContext::default())
            .unwrap();

        assert_eq!(run_id, None);
        assert!(history.list_runs().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_history_records_nothing() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path());
        let history = RunHistory::new(MemoryRunStore::new()).with_enabled(false);
        let written = writer.write(&GeneratedArtifact::new("a.txt", "x"), WriteOptions::default());

        assert_eq!(
            history
                .record(&source(), &[written], &RecordContext::default())
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_record_writes_backup_and_manifest() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path().join("app"));
        let history = RunHistory::new(FsRunStore::new(temp.path().join("history")));
        let artifact = GeneratedArtifact::new("Models/Post.php", "v1");
        writer.write(&artifact, WriteOptions::default());
        let overwritten = writer.write(
            &GeneratedArtifact::new("Models/Post.php", "v2"),
            WriteOptions {
                dry_run: false,
                force: true,
            },
        );
        let fresh = writer.write(&GeneratedArtifact::new("Models/Tag.php", "t"), WriteOptions::default());

        let run_id = history
            .record(
                &source(),
                &[overwritten, fresh],
                &RecordContext {
                    execution_id: Some("exec-1".to_string()),
                    options: WriteOptions::default(),
                },
            )
            .unwrap()
            .unwrap();

        let run = history.get_run(&run_id).unwrap().unwrap();
        assert_eq!(run.state, RunState::Persisted);
        assert_eq!(run.execution_id(), Some("exec-1"));
        assert_eq!(run.manifest.entries.len(), 2);

        let first = &run.manifest.entries[0];
        assert_eq!(first.status, WriteStatus::Overwritten);
        assert_eq!(first.backup.as_deref(), Some("000_Models__Post.php.bak"));
        assert_eq!(first.previous_size, Some(2));
        let backup = temp.path().join("history").join(&run_id).join("000_Models__Post.php.bak");
        assert_eq!(std::fs::read(backup).unwrap(), b"v1");

        let second = &run.manifest.entries[1];
        assert_eq!(second.status, WriteStatus::Written);
        assert!(second.backup.is_none());
        assert!(second.previous_hash.is_none());
    }

    #[test]
    fn test_list_runs_newest_first() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path());
        let history = RunHistory::new(MemoryRunStore::new());

        let mut ids = Vec::new();
        for name in ["a.txt", "b.txt", "c.txt"] {
            let outcome = writer.write(&GeneratedArtifact::new(name, "x"), WriteOptions::default());
            ids.push(
                history
                    .record(&source(), &[outcome], &RecordContext::default())
                    .unwrap()
                    .unwrap(),
            );
            std::thread::sleep(std::time::Duration::from_millis(3));
        }

        let listed: Vec<String> = history
            .list_runs()
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        ids.reverse();
        assert_eq!(listed, ids);
        assert_eq!(history.get_latest_run().unwrap().unwrap().id(), ids[0]);
        assert!(history.get_run("missing").unwrap().is_none());
    }

    #[test]
    fn test_run_ids_sort_by_time() {
        let early = DateTime::parse_from_rfc3339("2024-03-09T07:05:59.120Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2024-03-09T07:05:59.121Z")
            .unwrap()
            .with_timezone(&Utc);
        let a = new_run_id(early);
        let b = new_run_id(late);
        assert!(a.starts_with("20240309T070559120Z-"));
        assert!(a < b);
    }
}
