//! Case-insensitive directory reconciliation
//!
//! Case-insensitive filesystems (macOS, Windows) resolve `app/models` to an
//! existing `app/Models`; case-sensitive ones create a second directory.
//! Every segment is therefore matched against its siblings by name before
//! anything is created, so both kinds of filesystem converge on one tree.
//!
//! After writing `Foo/bar.txt`, a request for `foo/bar.txt` lands in the same
//! file under either policy. [`CasePolicy::Adopt`] leaves the tree as
//! `Foo/bar.txt`, matching what a case-insensitive filesystem does on its
//! own. [`CasePolicy::Rename`] (the default) renames `Foo` to `foo`.

use crate::error::{IoContext, ReconcileError, Result};
use crate::utils::make_short_random_id;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// What to do when a directory segment exists under a different casing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CasePolicy {
    /// Rename the existing directory so its casing matches the request:
    /// `Foo/` becomes `foo/` for a `foo/bar.txt` request
    #[default]
    Rename,
    /// Keep the existing directory and write into it: `foo/bar.txt` is
    /// written to `Foo/bar.txt` and `Foo` keeps its name
    Adopt,
}

/// Action taken for one path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentAction {
    Existing,
    Created,
    Renamed { from: String },
    Adopted { existing: String },
}

/// Ensure `relative_dir` exists under `root`, reconciling casing per segment.
///
/// Returns the real on-disk directory (which differs from `root/relative_dir`
/// only under [`CasePolicy::Adopt`]) and the per-segment actions taken.
pub fn ensure_directory(
    root: &Path,
    relative_dir: &Path,
    policy: CasePolicy,
) -> Result<(PathBuf, Vec<SegmentAction>)> {
    let mut current = root.to_path_buf();
    let mut actions = Vec::new();

    if !current.exists() {
        fs::create_dir_all(&current).at_path(&current)?;
    }

    for component in relative_dir.components() {
        let segment = match component {
            Component::Normal(segment) => segment.to_string_lossy().into_owned(),
            Component::CurDir => continue,
            other => {
                return Err(ReconcileError::CaseConflict {
                    path: relative_dir.to_path_buf(),
                    message: format!("unsupported path component {:?}", other),
                });
            }
        };

        let action = reconcile_segment(&current, &segment, policy)?;
        current = match &action {
            SegmentAction::Adopted { existing } => current.join(existing),
            _ => current.join(&segment),
        };
        actions.push(action);
    }

    Ok((current, actions))
}

/// How one requested segment relates to the entries already in its parent
enum SegmentMatch {
    Exact,
    Differently(String),
    Missing,
}

fn match_segment(parent: &Path, segment: &str) -> Result<SegmentMatch> {
    let mut case_match: Option<String> = None;

    for entry in fs::read_dir(parent).at_path(parent)? {
        let entry = entry.at_path(parent)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == segment {
            return if entry.path().is_dir() {
                Ok(SegmentMatch::Exact)
            } else {
                Err(ReconcileError::CaseConflict {
                    path: entry.path(),
                    message: "a file occupies the directory path".to_string(),
                })
            };
        }
        if case_match.is_none() && entry.path().is_dir() && name.to_lowercase() == segment.to_lowercase() {
            case_match = Some(name);
        }
    }

    Ok(case_match.map_or(SegmentMatch::Missing, SegmentMatch::Differently))
}

fn reconcile_segment(parent: &Path, segment: &str, policy: CasePolicy) -> Result<SegmentAction> {
    let target = parent.join(segment);
    match match_segment(parent, segment)? {
        SegmentMatch::Exact => Ok(SegmentAction::Existing),
        SegmentMatch::Missing => {
            fs::create_dir(&target).at_path(&target)?;
            tracing::debug!(path = %target.display(), "created directory");
            Ok(SegmentAction::Created)
        }
        SegmentMatch::Differently(existing) if policy == CasePolicy::Adopt => {
            tracing::debug!(
                requested = %segment,
                existing = %existing,
                "adopting differently-cased directory"
            );
            Ok(SegmentAction::Adopted { existing })
        }
        SegmentMatch::Differently(existing) => {
            rename_case(parent, &existing, segment)?;
            tracing::info!(
                from = %parent.join(&existing).display(),
                to = %target.display(),
                "renamed directory to expected casing"
            );
            Ok(SegmentAction::Renamed { from: existing })
        }
    }
}

/// Find the existing directory [`ensure_directory`] would settle on for
/// `relative_dir`, without creating or renaming anything.
///
/// Returns `Ok(None)` when some segment has no match under any casing.
pub fn locate_directory(root: &Path, relative_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = root.to_path_buf();
    if !current.is_dir() {
        return Ok(None);
    }

    for component in relative_dir.components() {
        let segment = match component {
            Component::Normal(segment) => segment.to_string_lossy().into_owned(),
            Component::CurDir => continue,
            other => {
                return Err(ReconcileError::CaseConflict {
                    path: relative_dir.to_path_buf(),
                    message: format!("unsupported path component {:?}", other),
                });
            }
        };
        current = match match_segment(&current, &segment)? {
            SegmentMatch::Exact => current.join(&segment),
            SegmentMatch::Differently(existing) => current.join(existing),
            SegmentMatch::Missing => return Ok(None),
        };
    }

    Ok(Some(current))
}

/// Rename `parent/from` to `parent/to` where the names differ only by case.
///
/// A direct rename is a no-op on some case-insensitive filesystems, so the
/// result is verified and, when needed, retried through a temporary name.
fn rename_case(parent: &Path, from: &str, to: &str) -> Result<()> {
    let source = parent.join(from);
    let target = parent.join(to);

    if fs::rename(&source, &target).is_ok() && has_exact_entry(parent, to) {
        return Ok(());
    }

    let temp = parent.join(format!(".{}", make_short_random_id("ggen-case", 8)));
    let first = fs::rename(&source, &temp);
    if let Err(err) = first {
        return Err(ReconcileError::CaseConflict {
            path: source,
            message: format!("rename to temporary name failed: {}", err),
        });
    }
    if let Err(err) = fs::rename(&temp, &target) {
        // Put the directory back under its original name before giving up.
        let _ = fs::rename(&temp, &source);
        return Err(ReconcileError::CaseConflict {
            path: source,
            message: format!("rename from temporary name failed: {}", err),
        });
    }
    Ok(())
}

fn has_exact_entry(parent: &Path, name: &str) -> bool {
    fs::read_dir(parent)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .any(|entry| entry.file_name().to_string_lossy() == name)
        })
        .unwrap_or(false)
}
