//! Rollback of recorded runs
//!
//! Runs are reverted newest first and each run's entries in reverse manifest
//! order, so a file touched by several runs ends up at its oldest recorded
//! state. Entries are independent: a failing entry is reported and the
//! remaining entries are still processed.
//!
//! | recorded status | live file  | action                           |
//! |-----------------|------------|----------------------------------|
//! | `written`       | present    | delete → `deleted`               |
//! | `written`       | missing    | nothing → `skipped`              |
//! | `overwritten`   | any        | restore backup → `restored`      |
//! | `overwritten`   | no backup  | `error`                          |

use super::{GenerationRun, RollbackMarker, RunEntry, RunHistory, RunStore};
use crate::error::{ReconcileError, Result};
use crate::logging::run_span;
use crate::utils::path_to_forward_slashes;
use crate::writer::{WriteStatus, atomic_write};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use strum::Display;

/// Which runs to revert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackSelection {
    /// Explicit run ids; every id must exist
    Runs(Vec<String>),
    /// Every not-yet-rolled-back run sharing an execution id
    Execution(String),
    /// The most recent not-yet-rolled-back run, widened to its execution group
    Latest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackOptions {
    /// Report what would happen without touching files or markers
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RollbackAction {
    Restored,
    Deleted,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackEntry {
    pub run_id: String,
    pub path: String,
    pub absolute_path: PathBuf,
    pub action: RollbackAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollbackSummary {
    pub restored: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RollbackSummary {
    pub fn from_entries(entries: &[RollbackEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut summary, entry| {
            match entry.action {
                RollbackAction::Restored => summary.restored += 1,
                RollbackAction::Deleted => summary.deleted += 1,
                RollbackAction::Skipped => summary.skipped += 1,
                RollbackAction::Error => summary.errors += 1,
            }
            summary
        })
    }

    pub fn is_failed(&self) -> bool {
        self.errors > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub runs: Vec<String>,
    pub dry_run: bool,
    pub entries: Vec<RollbackEntry>,
    pub summary: RollbackSummary,
}

impl<S: RunStore> RunHistory<S> {
    /// Resolve a selection to runs, newest first
    pub fn select_runs(&self, selection: &RollbackSelection) -> Result<Vec<GenerationRun>> {
        let selected = match selection {
            RollbackSelection::Runs(ids) => {
                let mut runs = Vec::with_capacity(ids.len());
                for id in ids {
                    let run = self
                        .get_run(id)?
                        .ok_or_else(|| ReconcileError::RunNotFound(id.clone()))?;
                    if !runs.iter().any(|r: &GenerationRun| r.id() == run.id()) {
                        runs.push(run);
                    }
                }
                runs.sort_by(|a, b| {
                    b.manifest
                        .timestamp
                        .cmp(&a.manifest.timestamp)
                        .then_with(|| b.id().cmp(a.id()))
                });
                runs
            }
            RollbackSelection::Execution(execution_id) => self
                .list_runs()?
                .into_iter()
                .filter(|run| !run.is_rolled_back() && run.execution_id() == Some(execution_id))
                .collect(),
            RollbackSelection::Latest => {
                let pending: Vec<GenerationRun> = self
                    .list_runs()?
                    .into_iter()
                    .filter(|run| !run.is_rolled_back())
                    .collect();
                match pending.first().map(|run| run.manifest.execution_id.clone()) {
                    None => Vec::new(),
                    Some(None) => pending.into_iter().take(1).collect(),
                    Some(Some(group)) => pending
                        .into_iter()
                        .filter(|run| run.execution_id() == Some(group.as_str()))
                        .collect(),
                }
            }
        };

        if selected.is_empty() {
            return Err(ReconcileError::NothingToRollBack);
        }
        Ok(selected)
    }

    pub fn rollback(
        &self,
        selection: &RollbackSelection,
        options: RollbackOptions,
    ) -> Result<RollbackReport> {
        let runs = self.select_runs(selection)?;
        let mut entries = Vec::new();

        for run in &runs {
            let _span = run_span(run.id()).entered();
            if run.is_rolled_back() {
                tracing::warn!(run_id = %run.id(), "run was already rolled back; reverting again");
            }

            let before = entries.len();
            for entry in run.manifest.entries.iter().rev() {
                if !entry.status.is_change() {
                    continue;
                }
                entries.push(self.revert_entry(run, entry, options));
            }

            let run_entries = &entries[before..];
            let failed = run_entries.iter().any(|e| e.action == RollbackAction::Error);
            tracing::info!(
                run_id = %run.id(),
                entries = run_entries.len(),
                failed,
                dry_run = options.dry_run,
                "run reverted"
            );

            // Failed runs stay selectable so the operator can retry
            if !options.dry_run && !failed {
                self.store.mark_rolled_back(
                    run.id(),
                    &RollbackMarker {
                        rolled_back_at: Utc::now(),
                    },
                )?;
            }
        }

        let summary = RollbackSummary::from_entries(&entries);
        Ok(RollbackReport {
            runs: runs.iter().map(|run| run.id().to_string()).collect(),
            dry_run: options.dry_run,
            entries,
            summary,
        })
    }

    fn revert_entry(
        &self,
        run: &GenerationRun,
        entry: &RunEntry,
        options: RollbackOptions,
    ) -> RollbackEntry {
        let result = |action: RollbackAction, message: Option<String>| RollbackEntry {
            run_id: run.id().to_string(),
            path: entry.path.clone(),
            absolute_path: entry.absolute_path.clone(),
            action,
            message,
        };
        let target = &entry.absolute_path;

        match entry.status {
            WriteStatus::Written => {
                if !target.exists() {
                    return result(
                        RollbackAction::Skipped,
                        Some("file already absent".to_string()),
                    );
                }
                if options.dry_run {
                    return result(RollbackAction::Deleted, None);
                }
                match fs::remove_file(target) {
                    Ok(()) => {
                        tracing::debug!(path = %path_to_forward_slashes(target), "deleted");
                        result(RollbackAction::Deleted, None)
                    }
                    Err(err) => {
                        tracing::warn!(path = %target.display(), error = %err, "delete failed");
                        result(RollbackAction::Error, Some(format!("delete failed: {}", err)))
                    }
                }
            }
            WriteStatus::Overwritten => {
                let Some(backup) = entry.backup.as_deref() else {
                    return result(
                        RollbackAction::Error,
                        Some("no backup recorded for overwritten file".to_string()),
                    );
                };
                let content = match self.store.read_backup(run.id(), backup) {
                    Ok(content) => content,
                    Err(err) => {
                        tracing::warn!(run_id = %run.id(), backup, error = %err, "backup unreadable");
                        return result(
                            RollbackAction::Error,
                            Some(format!("backup {} unreadable: {}", backup, err)),
                        );
                    }
                };
                if options.dry_run {
                    return result(RollbackAction::Restored, None);
                }
                if let Some(parent) = target.parent() {
                    if let Err(err) = fs::create_dir_all(parent) {
                        return result(
                            RollbackAction::Error,
                            Some(format!("could not recreate directory: {}", err)),
                        );
                    }
                }
                match atomic_write(target, &content) {
                    Ok(()) => {
                        tracing::debug!(path = %path_to_forward_slashes(target), "restored");
                        result(RollbackAction::Restored, None)
                    }
                    Err(err) => {
                        tracing::warn!(path = %target.display(), error = %err, "restore failed");
                        result(RollbackAction::Error, Some(format!("restore failed: {}", err)))
                    }
                }
            }
            _ => result(RollbackAction::Skipped, None),
        }
    }
}
