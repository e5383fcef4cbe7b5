//! Timestamp Sequencer
//!
//! Issues filename ordering prefixes (`2024_03_09_070559_create_posts_table.php`)
//! that stay strictly increasing across artifacts, namespaces and separate
//! process invocations. State is re-read from the store on every call and
//! persisted immediately after every issuance. A [`SequencerPreview`] keeps
//! the same bookkeeping in memory so a dry run sees the keys it would issue.
//!
//! ## Resolution order for a namespace
//! 1. An existing artifact with a canonical key is reused as-is.
//! 2. An existing artifact with only a legacy 14-digit key is renamed to a
//!    fresh canonical key, which is returned.
//! 3. Otherwise a fresh key is minted: at least the wall clock, and strictly
//!    greater than every key recorded for any namespace.

pub mod key;
pub mod store;

pub use key::{KeyEncoding, SequenceKey};
pub use store::{
    Clock, FixedClock, JsonFileStore, MemorySequencerStore, SequencerState, SequencerStore,
    SystemClock,
};

use crate::error::{IoContext, ReconcileError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where previously generated artifacts of a namespace live.
/// Matching files are named `<key>_<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingArtifacts {
    pub directory: PathBuf,
    pub suffix: String,
}

impl ExistingArtifacts {
    pub fn new(directory: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            suffix: suffix.into(),
        }
    }

    pub fn path_for(&self, key: &SequenceKey) -> PathBuf {
        self.directory.join(file_name_for(key, &self.suffix))
    }
}

pub fn file_name_for(key: &SequenceKey, suffix: &str) -> String {
    format!("{}_{}", key, suffix)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Newly minted
    Fresh,
    /// Taken from an existing canonical artifact
    Reused { path: PathBuf },
    /// A legacy artifact was (or, in preview, would be) renamed to this key
    Reconciled { from: PathBuf, to: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedKey {
    pub key: SequenceKey,
    pub origin: KeyOrigin,
}

struct Discovered {
    key: SequenceKey,
    encoding: KeyEncoding,
    path: PathBuf,
}

pub struct TimestampSequencer<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S: SequencerStore> TimestampSequencer<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: SequencerStore, C: Clock> TimestampSequencer<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Issue the key for `namespace`, renaming a legacy artifact if needed
    /// and persisting the result.
    pub fn next_key(
        &self,
        namespace: &str,
        existing: Option<&ExistingArtifacts>,
    ) -> Result<IssuedKey> {
        self.resolve(namespace, existing, true)
    }

    /// Same answer as [`next_key`](Self::next_key) for the current state,
    /// without renaming anything or persisting state.
    pub fn preview_key(
        &self,
        namespace: &str,
        existing: Option<&ExistingArtifacts>,
    ) -> Result<IssuedKey> {
        let mut state = self.store.load()?;
        self.resolve_in(&mut state, namespace, existing, false)
    }

    /// Start a series of previews that see each other's keys. Nothing is
    /// renamed or persisted.
    pub fn preview(&self) -> Result<SequencerPreview<'_, S, C>> {
        Ok(SequencerPreview {
            sequencer: self,
            state: self.store.load()?,
        })
    }

    pub fn last_issued(&self, namespace: &str) -> Result<Option<SequenceKey>> {
        let state = self.store.load()?;
        state.get(namespace).map(|raw| raw.parse()).transpose()
    }

    fn resolve(
        &self,
        namespace: &str,
        existing: Option<&ExistingArtifacts>,
        commit: bool,
    ) -> Result<IssuedKey> {
        let mut state = self.store.load()?;
        self.resolve_in(&mut state, namespace, existing, commit)
    }

    /// Resolve against `state`, recording the answer in it. `commit` renames
    /// legacy artifacts and saves `state` to the store.
    fn resolve_in(
        &self,
        state: &mut SequencerState,
        namespace: &str,
        existing: Option<&ExistingArtifacts>,
        commit: bool,
    ) -> Result<IssuedKey> {
        let high_water = high_water_mark(state)?;
        let recorded = state
            .get(namespace)
            .map(|raw| raw.parse::<SequenceKey>())
            .transpose()?;

        let discovered = match existing {
            Some(existing) => discover(existing)?,
            None => Vec::new(),
        };

        let newest_canonical = discovered
            .iter()
            .filter(|d| d.encoding == KeyEncoding::Canonical)
            .max_by_key(|d| d.key);
        if let Some(found) = newest_canonical {
            if recorded.is_none_or(|last| last < found.key) {
                state.insert(namespace.to_string(), found.key.to_string());
                if commit {
                    self.store.save(state)?;
                }
            }
            tracing::debug!(namespace, key = %found.key, "reusing existing artifact key");
            return Ok(IssuedKey {
                key: found.key,
                origin: KeyOrigin::Reused {
                    path: found.path.clone(),
                },
            });
        }

        let mut key = self.fresh_key(high_water);

        let newest_legacy = discovered
            .iter()
            .filter(|d| d.encoding == KeyEncoding::Legacy)
            .max_by_key(|d| d.key);
        let origin = match (newest_legacy, existing) {
            (Some(legacy), Some(existing)) => {
                while existing.path_for(&key).exists() {
                    key = key.next();
                }
                let target = existing.path_for(&key);
                if commit {
                    fs::rename(&legacy.path, &target).at_path(&legacy.path)?;
                    tracing::info!(
                        namespace,
                        from = %legacy.path.display(),
                        to = %target.display(),
                        "renamed legacy artifact to canonical key"
                    );
                }
                KeyOrigin::Reconciled {
                    from: legacy.path.clone(),
                    to: target,
                }
            }
            _ => KeyOrigin::Fresh,
        };

        state.insert(namespace.to_string(), key.to_string());
        if commit {
            self.store.save(state)?;
            tracing::debug!(namespace, key = %key, "issued sequence key");
        }

        Ok(IssuedKey { key, origin })
    }

    /// At least the wall clock, strictly above `floor`
    fn fresh_key(&self, floor: Option<SequenceKey>) -> SequenceKey {
        let now = SequenceKey::from_datetime(self.clock.now());
        match floor {
            Some(floor) if now <= floor => floor.next(),
            _ => now,
        }
    }
}

/// In-memory overlay over the persisted state for a dry run
pub struct SequencerPreview<'a, S, C> {
    sequencer: &'a TimestampSequencer<S, C>,
    state: SequencerState,
}

impl<S: SequencerStore, C: Clock> SequencerPreview<'_, S, C> {
    /// The key [`TimestampSequencer::next_key`] would issue after every
    /// earlier call on this preview had been committed
    pub fn next_key(
        &mut self,
        namespace: &str,
        existing: Option<&ExistingArtifacts>,
    ) -> Result<IssuedKey> {
        self.sequencer
            .resolve_in(&mut self.state, namespace, existing, false)
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }
}

fn high_water_mark(state: &SequencerState) -> Result<Option<SequenceKey>> {
    let mut highest: Option<SequenceKey> = None;
    for raw in state.values() {
        let key: SequenceKey = raw.parse()?;
        if highest.is_none_or(|h| key > h) {
            highest = Some(key);
        }
    }
    Ok(highest)
}

fn discover(existing: &ExistingArtifacts) -> Result<Vec<Discovered>> {
    if !existing.directory.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&existing.directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| walk_error(&existing.directory, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if let Some((key, encoding, rest)) = SequenceKey::split_file_name(&name) {
            if rest == existing.suffix {
                found.push(Discovered {
                    key,
                    encoding,
                    path: entry.path().to_path_buf(),
                });
            }
        }
    }
    Ok(found)
}

fn walk_error(directory: &Path, err: walkdir::Error) -> ReconcileError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| directory.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
    ReconcileError::io(path, source)
}
