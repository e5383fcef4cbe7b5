//! Artifact Writer
//!
//! Decides, for one generated artifact, whether to write, overwrite, skip or
//! preview it against the real filesystem. Every failure path produces an
//! `error`-status [`WriteOutcome`] instead of an `Err`, so a batch keeps going
//! past a single bad file.
//!
//! ## Decision table
//! | target    | dry run | force / force_overwrite | status        |
//! |-----------|---------|-------------------------|---------------|
//! | any       | yes     | any                     | `preview`     |
//! | missing   | no      | any                     | `written`     |
//! | exists    | no      | neither                 | `skipped`     |
//! | exists    | no      | either                  | `overwritten` |

pub mod casing;

pub use casing::{CasePolicy, SegmentAction, ensure_directory, locate_directory};

use crate::error::Result;
use crate::utils::{content_hash, path_to_forward_slashes};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use tempfile::NamedTempFile;

// =============================================================================
// Type Definitions
// =============================================================================

/// One generated file, as produced by the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub relative_path: String,
    pub content: Vec<u8>,
    #[serde(default)]
    pub force_overwrite: bool,
}

impl GeneratedArtifact {
    pub fn new(relative_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
            force_overwrite: false,
        }
    }

    pub fn force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }
}

/// Per-pass write options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    pub dry_run: bool,
    pub force: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WriteStatus {
    Written,
    Overwritten,
    Skipped,
    Preview,
    Error,
}

impl WriteStatus {
    /// Statuses that changed the filesystem and can be rolled back
    pub fn is_change(&self) -> bool {
        matches!(self, WriteStatus::Written | WriteStatus::Overwritten)
    }
}

/// Snapshot of a file's content taken before it was overwritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousContent {
    pub hash: String,
    pub size: u64,
    pub content: Vec<u8>,
}

impl PreviousContent {
    fn capture(content: Vec<u8>) -> Self {
        Self {
            hash: content_hash(&content),
            size: content.len() as u64,
            content,
        }
    }
}

/// Result of attempting to materialize one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub status: WriteStatus,
    pub byte_size: u64,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub previous: Option<PreviousContent>,
}

impl WriteOutcome {
    fn new(artifact: &GeneratedArtifact, absolute_path: PathBuf, status: WriteStatus) -> Self {
        Self {
            relative_path: artifact.relative_path.clone(),
            absolute_path,
            status,
            byte_size: artifact.content.len() as u64,
            content_hash: content_hash(&artifact.content),
            message: None,
            previous: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Skipped outcome for an artifact whose target already holds the desired
    /// content; the writer is never consulted for these.
    pub fn unchanged(artifact: &GeneratedArtifact, absolute_path: PathBuf) -> Self {
        Self::new(artifact, absolute_path, WriteStatus::Skipped).with_message("already up to date")
    }

    /// Error outcome for an artifact that could not even be prepared
    pub fn failed(artifact: &GeneratedArtifact, absolute_path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(artifact, absolute_path, WriteStatus::Error).with_message(message)
    }

    pub fn previous_content_hash(&self) -> Option<&str> {
        self.previous.as_ref().map(|p| p.hash.as_str())
    }

    pub fn previous_byte_size(&self) -> Option<u64> {
        self.previous.as_ref().map(|p| p.size)
    }

    pub fn previous_content(&self) -> Option<&[u8]> {
        self.previous.as_ref().map(|p| p.content.as_slice())
    }
}

// =============================================================================
// ArtifactWriter
// =============================================================================

/// Materializes artifacts under a workspace root
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
    case_policy: CasePolicy,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            case_policy: CasePolicy::default(),
        }
    }

    pub fn with_case_policy(mut self, policy: CasePolicy) -> Self {
        self.case_policy = policy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    /// The existing file a write of `relative_path` would land on, following
    /// directories that differ from the request only in case.
    pub fn locate(&self, relative_path: &str) -> Result<Option<PathBuf>> {
        let relative = Path::new(relative_path);
        let Some(file_name) = relative.file_name() else {
            return Ok(None);
        };
        let parent = relative.parent().unwrap_or_else(|| Path::new(""));
        Ok(locate_directory(&self.root, parent)?
            .map(|directory| directory.join(file_name))
            .filter(|path| path.is_file()))
    }

    /// Write one artifact. Never returns `Err`; see the module decision table.
    pub fn write(&self, artifact: &GeneratedArtifact, options: WriteOptions) -> WriteOutcome {
        let requested = self.resolve(&artifact.relative_path);

        if options.dry_run {
            tracing::debug!(path = %artifact.relative_path, "preview only");
            return WriteOutcome::new(artifact, requested, WriteStatus::Preview);
        }

        let relative = Path::new(&artifact.relative_path);
        let Some(file_name) = relative.file_name() else {
            return WriteOutcome::failed(artifact, requested, "artifact path has no file name");
        };
        let parent = relative.parent().unwrap_or_else(|| Path::new(""));

        let directory = match ensure_directory(&self.root, parent, self.case_policy) {
            Ok((directory, _)) => directory,
            Err(err) => {
                tracing::warn!(path = %artifact.relative_path, error = %err, "directory preparation failed");
                return WriteOutcome::failed(artifact, requested, err.to_string());
            }
        };
        let target = directory.join(file_name);

        if !target.exists() {
            return match atomic_write(&target, &artifact.content) {
                Ok(()) => {
                    tracing::debug!(path = %path_to_forward_slashes(&target), "written");
                    WriteOutcome::new(artifact, target, WriteStatus::Written)
                }
                Err(err) => {
                    tracing::warn!(path = %target.display(), error = %err, "write failed");
                    WriteOutcome::failed(artifact, target, format!("write failed: {}", err))
                }
            };
        }

        if !(options.force || artifact.force_overwrite) {
            return WriteOutcome::new(artifact, target, WriteStatus::Skipped)
                .with_message("file exists; use force to overwrite");
        }

        let previous = match fs::read(&target) {
            Ok(bytes) => PreviousContent::capture(bytes),
            Err(err) => {
                tracing::warn!(path = %target.display(), error = %err, "pre-overwrite read failed");
                return WriteOutcome::failed(
                    artifact,
                    target,
                    format!("could not read existing file: {}", err),
                );
            }
        };

        match atomic_write(&target, &artifact.content) {
            Ok(()) => {
                tracing::debug!(path = %path_to_forward_slashes(&target), "overwritten");
                let mut outcome = WriteOutcome::new(artifact, target, WriteStatus::Overwritten);
                outcome.previous = Some(previous);
                outcome
            }
            Err(err) => {
                tracing::warn!(path = %target.display(), error = %err, "overwrite failed");
                let mut outcome =
                    WriteOutcome::failed(artifact, target, format!("write failed: {}", err));
                outcome.previous = Some(previous);
                outcome
            }
        }
    }

    /// Write a batch in order, one outcome per artifact
    pub fn write_all<'a, I>(&self, artifacts: I, options: WriteOptions) -> Vec<WriteOutcome>
    where
        I: IntoIterator<Item = &'a GeneratedArtifact>,
    {
        artifacts
            .into_iter()
            .map(|artifact| self.write(artifact, options))
            .collect()
    }
}

/// Write to a temporary sibling, then rename over the target
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
