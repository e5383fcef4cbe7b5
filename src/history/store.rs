//! Run persistence
//!
//! One directory per run under the history root:
//!
//! ```text
//! .ggen/history/
//!   20240309T070559123Z-k3p9qa/
//!     manifest.json
//!     rolled_back.json        (only after a rollback)
//!     000_app__Models__Post.php.bak
//! ```
//!
//! The run index is the directory listing; there is no separate index file.

use super::{GenerationRun, RollbackMarker, RunManifest};
use crate::error::{IoContext, ReconcileError, Result};
use crate::utils::{read_json_or_default, write_json_atomic};
use crate::writer::atomic_write;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ROLLED_BACK_FILE: &str = "rolled_back.json";

/// Storage seam for generation runs
pub trait RunStore {
    /// Ids of every persisted run, in no particular order
    fn list_ids(&self) -> Result<Vec<String>>;

    /// A persisted run, or `None` when no manifest exists for `id`
    fn load(&self, id: &str) -> Result<Option<GenerationRun>>;

    fn create(&self, id: &str) -> Result<()>;

    fn write_backup(&self, id: &str, name: &str, content: &[u8]) -> Result<()>;

    fn read_backup(&self, id: &str, name: &str) -> Result<Vec<u8>>;

    /// Persisting the manifest is what makes a run visible
    fn save_manifest(&self, manifest: &RunManifest) -> Result<()>;

    fn mark_rolled_back(&self, id: &str, marker: &RollbackMarker) -> Result<()>;
}

// =============================================================================
// FsRunStore
// =============================================================================

#[derive(Debug, Clone)]
pub struct FsRunStore {
    root: PathBuf,
}

impl FsRunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }
}

impl RunStore for FsRunStore {
    fn list_ids(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root).at_path(&self.root)? {
            let entry = entry.at_path(&self.root)?;
            if !entry.path().join(MANIFEST_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        Ok(ids)
    }

    fn load(&self, id: &str) -> Result<Option<GenerationRun>> {
        let dir = self.run_dir(id);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&manifest_path).at_path(&manifest_path)?;
        let manifest: RunManifest = serde_json::from_str(&content)
            .map_err(|err| ReconcileError::json(&manifest_path, err))?;
        let marker: Option<RollbackMarker> = read_json_or_default(&dir.join(ROLLED_BACK_FILE))?;

        Ok(Some(GenerationRun::new(manifest, marker, Some(dir))))
    }

    fn create(&self, id: &str) -> Result<()> {
        let dir = self.run_dir(id);
        fs::create_dir_all(&dir).at_path(&dir)
    }

    fn write_backup(&self, id: &str, name: &str, content: &[u8]) -> Result<()> {
        let path = self.run_dir(id).join(name);
        atomic_write(&path, content).at_path(&path)
    }

    fn read_backup(&self, id: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.run_dir(id).join(name);
        fs::read(&path).at_path(&path)
    }

    fn save_manifest(&self, manifest: &RunManifest) -> Result<()> {
        write_json_atomic(&self.run_dir(&manifest.run_id).join(MANIFEST_FILE), manifest)
    }

    fn mark_rolled_back(&self, id: &str, marker: &RollbackMarker) -> Result<()> {
        write_json_atomic(&self.run_dir(id).join(ROLLED_BACK_FILE), marker)
    }
}

// =============================================================================
// MemoryRunStore
// =============================================================================

#[derive(Debug, Clone, Default)]
struct MemoryRun {
    manifest: Option<RunManifest>,
    backups: HashMap<String, Vec<u8>>,
    marker: Option<RollbackMarker>,
}

/// In-memory store for tests; clones share the same runs
#[derive(Debug, Clone, Default)]
pub struct MemoryRunStore {
    runs: Arc<Mutex<BTreeMap<String, MemoryRun>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a backup, simulating an operator deleting it by hand
    pub fn remove_backup(&self, id: &str, name: &str) -> bool {
        self.runs
            .lock()
            .get_mut(id)
            .is_some_and(|run| run.backups.remove(name).is_some())
    }
}

impl RunStore for MemoryRunStore {
    fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .runs
            .lock()
            .iter()
            .filter(|(_, run)| run.manifest.is_some())
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn load(&self, id: &str) -> Result<Option<GenerationRun>> {
        let runs = self.runs.lock();
        Ok(runs.get(id).and_then(|run| {
            run.manifest
                .clone()
                .map(|manifest| GenerationRun::new(manifest, run.marker.clone(), None))
        }))
    }

    fn create(&self, id: &str) -> Result<()> {
        self.runs.lock().entry(id.to_string()).or_default();
        Ok(())
    }

    fn write_backup(&self, id: &str, name: &str, content: &[u8]) -> Result<()> {
        self.runs
            .lock()
            .entry(id.to_string())
            .or_default()
            .backups
            .insert(name.to_string(), content.to_vec());
        Ok(())
    }

    fn read_backup(&self, id: &str, name: &str) -> Result<Vec<u8>> {
        self.runs
            .lock()
            .get(id)
            .and_then(|run| run.backups.get(name).cloned())
            .ok_or_else(|| {
                ReconcileError::io(
                    Path::new(id).join(name),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "backup not found"),
                )
            })
    }

    fn save_manifest(&self, manifest: &RunManifest) -> Result<()> {
        self.runs
            .lock()
            .entry(manifest.run_id.clone())
            .or_default()
            .manifest = Some(manifest.clone());
        Ok(())
    }

    fn mark_rolled_back(&self, id: &str, marker: &RollbackMarker) -> Result<()> {
        match self.runs.lock().get_mut(id) {
            Some(run) => {
                run.marker = Some(marker.clone());
                Ok(())
            }
            None => Err(ReconcileError::RunNotFound(id.to_string())),
        }
    }
}
