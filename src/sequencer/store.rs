//! Persisted sequencer state
//!
//! The state document is a flat JSON object, namespace → last issued key:
//!
//! ```json
//! { "posts": "2024_03_09_070559", "users": "2024_03_09_070600" }
//! ```

use crate::error::Result;
use crate::utils::{read_json_or_default, write_json_atomic};
use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Namespace → last issued key (canonical encoding)
pub type SequencerState = BTreeMap<String, String>;

/// Load/save seam for sequencer state
pub trait SequencerStore {
    fn load(&self) -> Result<SequencerState>;
    fn save(&self, state: &SequencerState) -> Result<()>;
}

/// JSON document on disk; a missing file is an empty state
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SequencerStore for JsonFileStore {
    fn load(&self) -> Result<SequencerState> {
        read_json_or_default(&self.path)
    }

    fn save(&self, state: &SequencerState) -> Result<()> {
        write_json_atomic(&self.path, state)
    }
}

/// In-memory store; clones share the same state
#[derive(Debug, Clone, Default)]
pub struct MemorySequencerStore {
    state: Arc<Mutex<SequencerState>>,
}

impl MemorySequencerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SequencerState {
        self.state.lock().clone()
    }
}

impl SequencerStore for MemorySequencerStore {
    fn load(&self) -> Result<SequencerState> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &SequencerState) -> Result<()> {
        *self.state.lock() = state.clone();
        Ok(())
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Wall-clock source for fresh keys
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local time, matching how developers read migration prefixes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock for tests; clones share the same instant
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: Arc<Mutex<NaiveDateTime>>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            at: Arc::new(Mutex::new(at)),
        }
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.at.lock() = at;
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut at = self.at.lock();
        *at += chrono::Duration::seconds(secs);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.at.lock()
    }
}
