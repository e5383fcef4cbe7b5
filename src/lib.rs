//! Output reconciliation for generation runs.
//!
//! Generated artifacts land in a tree developers also edit by hand. This
//! crate decides per file whether to write, overwrite, skip or preview it,
//! keeps ordered filename prefixes monotonic across runs, merges managed
//! blocks into shared files without disturbing hand-written content, and
//! records every run so it can be rolled back.
//!
//! ## Modules
//! - [`writer`]: Artifact Writer with case-insensitive directory reconciliation.
//!   Under [`CasePolicy::Adopt`] a `foo/bar.txt` request after `Foo/bar.txt`
//!   rewrites `Foo/bar.txt` and keeps `Foo`; the default
//!   [`CasePolicy::Rename`] renames the directory to `foo`
//! - [`sequencer`]: Timestamp Sequencer
//! - [`ordering`]: Dependency-Ordered Aggregator and its persisted registry
//! - [`merge`]: Managed-Block Merger (block-replace and anchor-and-register)
//! - [`history`]: Run History & Rollback Manager
//! - [`session`]: one generation pass wiring the above together

pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod merge;
pub mod ordering;
pub mod report;
pub mod sequencer;
pub mod session;
pub mod utils;
pub mod writer;

pub use config::{CliArgs, Command, HistoryCommand, ReconcileConfig};
pub use error::{ErrorCode, ReconcileError, Result};
pub use history::{
    FsRunStore, GenerationRun, MemoryRunStore, RecordContext, RollbackSelection, RunHistory,
    RunStore, SourceIdentity,
};
pub use logging::{LoggingConfig, init_logging};
pub use merge::{PhpRouteSyntax, RouteRegistration, SeederLayout, merge_route};
pub use ordering::{DependencyEntity, DependencyOrder, order, order_with_report};
pub use report::OutcomeSummary;
pub use sequencer::{SequenceKey, SequencerStore, TimestampSequencer};
pub use session::{GenerationPlan, GenerationSession, PlannedArtifact, SessionReport};
pub use writer::{
    ArtifactWriter, CasePolicy, GeneratedArtifact, WriteOptions, WriteOutcome, WriteStatus,
};
