#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use ggen_reconcile::history::MemoryRunStore;
use ggen_reconcile::ordering::AggregateRegistry;
use ggen_reconcile::sequencer::{FixedClock, MemorySequencerStore};
use ggen_reconcile::{ArtifactWriter, GenerationSession, RunHistory, TimestampSequencer};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

pub type TestSession = GenerationSession<MemorySequencerStore, FixedClock, MemoryRunStore>;

/// Temporary working tree that is removed on drop
pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dir");
        }
        fs::write(&path, content).expect("write file");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).expect("read file")
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Names of the entries directly inside `dir`, sorted
    pub fn list(&self, dir: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path(dir))
            .expect("read dir")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn writer(&self) -> ArtifactWriter {
        ArtifactWriter::new(&self.root)
    }

    /// Session with in-memory sequencer and history, a fixed clock, and the
    /// aggregate registry under `.ggen/`
    pub fn session(&self, clock: &FixedClock) -> (TestSession, MemorySequencerStore, MemoryRunStore) {
        let sequencer_store = MemorySequencerStore::new();
        let run_store = MemoryRunStore::new();
        let session = GenerationSession::new(
            self.writer(),
            TimestampSequencer::with_clock(sequencer_store.clone(), clock.clone()),
            AggregateRegistry::new(self.path(".ggen/aggregates.json")),
            RunHistory::new(run_store.clone()),
        );
        (session, sequencer_store, run_store)
    }
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .expect("valid date")
        .and_hms_opt(hour, min, sec)
        .expect("valid time")
}
