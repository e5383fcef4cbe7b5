//! Generation session: one pass from a rendered plan to recorded outcomes
//!
//! A [`GenerationPlan`] lists what the rendering layer produced. The session
//! resolves ordered names through the sequencer, folds every merge aimed at
//! the same shared file into a single write, pushes everything through the
//! [`ArtifactWriter`] and records the pass in run history.

use crate::config::ReconcileConfig;
use crate::error::{IoContext, Result};
use crate::history::{FsRunStore, RecordContext, RunHistory, RunStore, SourceIdentity};
use crate::merge::{PhpRouteSyntax, RouteRegistration, SeederLayout, merge_route};
use crate::ordering::{AggregateRegistry, AggregateState, order_with_report};
use crate::report::OutcomeSummary;
use crate::sequencer::{
    Clock, ExistingArtifacts, JsonFileStore, SequencerPreview, SequencerStore, SystemClock,
    TimestampSequencer, file_name_for,
};
use crate::writer::{ArtifactWriter, GeneratedArtifact, WriteOptions, WriteOutcome};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;

// =============================================================================
// Plan
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub source: SourceIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub artifacts: Vec<PlannedArtifact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlannedArtifact {
    /// A plain file at a fixed path
    File {
        path: String,
        content: String,
        #[serde(default)]
        force_overwrite: bool,
    },
    /// A file named `<directory>/<key>_<suffix>` with a sequencer key
    Ordered {
        namespace: String,
        directory: String,
        suffix: String,
        content: String,
        #[serde(default)]
        force_overwrite: bool,
    },
    /// A registration merged into a route file
    Route {
        file: String,
        registration: RouteRegistration,
    },
    /// An entity registered into an aggregator file
    Aggregate {
        file: String,
        scope: String,
        name: String,
        #[serde(default)]
        dependencies: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub outcomes: Vec<WriteOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub summary: OutcomeSummary,
    /// Set when the pass succeeded but recording it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

// =============================================================================
// Session
// =============================================================================

/// Merges collected for one shared file
#[derive(Debug)]
enum PendingMerge {
    Routes(Vec<RouteRegistration>),
    Aggregate { scope: String },
}

enum Slot {
    Write(GeneratedArtifact),
    Merge(String),
    Failed(WriteOutcome),
}

pub struct GenerationSession<S: SequencerStore, C: Clock, R: RunStore> {
    writer: ArtifactWriter,
    sequencer: TimestampSequencer<S, C>,
    registry: AggregateRegistry,
    history: RunHistory<R>,
    routes: PhpRouteSyntax,
    seeders: SeederLayout,
}

impl GenerationSession<JsonFileStore, SystemClock, FsRunStore> {
    /// Session wired to the on-disk stores named by `config`
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self::new(
            ArtifactWriter::new(&config.workspace_root).with_case_policy(config.case_policy),
            TimestampSequencer::new(JsonFileStore::new(config.sequencer_state_path())),
            AggregateRegistry::new(config.aggregate_state_path()),
            RunHistory::new(FsRunStore::new(config.history_path()))
                .with_enabled(config.history_enabled),
        )
    }
}

impl<S: SequencerStore, C: Clock, R: RunStore> GenerationSession<S, C, R> {
    pub fn new(
        writer: ArtifactWriter,
        sequencer: TimestampSequencer<S, C>,
        registry: AggregateRegistry,
        history: RunHistory<R>,
    ) -> Self {
        Self {
            writer,
            sequencer,
            registry,
            history,
            routes: PhpRouteSyntax::new(),
            seeders: SeederLayout::default(),
        }
    }

    pub fn with_seeder_layout(mut self, layout: SeederLayout) -> Self {
        self.seeders = layout;
        self
    }

    pub fn history(&self) -> &RunHistory<R> {
        &self.history
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    /// Apply a plan. Per-artifact failures become `error` outcomes; `Err` is
    /// reserved for unreadable persisted state.
    pub fn apply(&self, plan: &GenerationPlan, options: WriteOptions) -> Result<SessionReport> {
        let span = tracing::info_span!(
            "generation_session",
            entity = %plan.source.entity,
            artifacts = plan.artifacts.len(),
            dry_run = options.dry_run
        );
        let _enter = span.enter();

        let mut aggregates = self.registry.load()?;
        // Dry runs key ordered artifacts against an overlay so each preview
        // sees the ones before it
        let mut preview = if options.dry_run {
            Some(self.sequencer.preview()?)
        } else {
            None
        };
        let mut aggregates_changed = false;
        let mut merges: IndexMap<String, PendingMerge> = IndexMap::new();
        let mut slots = Vec::with_capacity(plan.artifacts.len());

        for planned in &plan.artifacts {
            match planned {
                PlannedArtifact::File {
                    path,
                    content,
                    force_overwrite,
                } => slots.push(Slot::Write(
                    GeneratedArtifact::new(path.clone(), content.as_bytes())
                        .force_overwrite(*force_overwrite),
                )),
                PlannedArtifact::Ordered {
                    namespace,
                    directory,
                    suffix,
                    content,
                    force_overwrite,
                } => slots.push(self.plan_ordered(
                    namespace,
                    directory,
                    suffix,
                    content,
                    *force_overwrite,
                    preview.as_mut(),
                )),
                PlannedArtifact::Route { file, registration } => {
                    match merges.get_mut(file) {
                        None => {
                            merges.insert(
                                file.clone(),
                                PendingMerge::Routes(vec![registration.clone()]),
                            );
                            slots.push(Slot::Merge(file.clone()));
                        }
                        Some(PendingMerge::Routes(registrations)) => {
                            registrations.push(registration.clone())
                        }
                        Some(PendingMerge::Aggregate { .. }) => {
                            slots.push(Slot::Failed(self.conflicting_merge(file)))
                        }
                    }
                }
                PlannedArtifact::Aggregate {
                    file,
                    scope,
                    name,
                    dependencies,
                } => {
                    let compatible = match merges.get(file) {
                        None => {
                            merges.insert(
                                file.clone(),
                                PendingMerge::Aggregate {
                                    scope: scope.clone(),
                                },
                            );
                            slots.push(Slot::Merge(file.clone()));
                            true
                        }
                        Some(PendingMerge::Aggregate { scope: existing }) => existing == scope,
                        Some(PendingMerge::Routes(_)) => false,
                    };
                    if compatible {
                        aggregates_changed |= aggregates.register(scope, name, dependencies);
                    } else {
                        slots.push(Slot::Failed(self.conflicting_merge(file)));
                    }
                }
            }
        }

        if aggregates_changed && !options.dry_run {
            self.registry.save(&aggregates)?;
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Write(artifact) => self.writer.write(&artifact, options),
                Slot::Failed(outcome) => outcome,
                Slot::Merge(file) => match merges.get(&file) {
                    Some(pending) => self.apply_merge(&file, pending, &aggregates, options),
                    None => continue,
                },
            };
            outcomes.push(outcome);
        }

        let summary = OutcomeSummary::from_outcomes(&outcomes);
        let (run_id, history_error) = if options.dry_run {
            (None, None)
        } else {
            let context = RecordContext {
                execution_id: plan.execution_id.clone(),
                options,
            };
            match self.history.record(&plan.source, &outcomes, &context) {
                Ok(run_id) => (run_id, None),
                Err(err) => {
                    tracing::error!(error = %err, "failed to record generation run");
                    (None, Some(err.to_string()))
                }
            }
        };

        tracing::info!(
            written = summary.written,
            overwritten = summary.overwritten,
            skipped = summary.skipped,
            preview = summary.preview,
            errors = summary.errors,
            run_id = ?run_id,
            "generation pass complete"
        );

        Ok(SessionReport {
            outcomes,
            run_id,
            summary,
            history_error,
        })
    }

    fn plan_ordered(
        &self,
        namespace: &str,
        directory: &str,
        suffix: &str,
        content: &str,
        force_overwrite: bool,
        preview: Option<&mut SequencerPreview<'_, S, C>>,
    ) -> Slot {
        let existing = ExistingArtifacts::new(self.writer.resolve(directory), suffix);
        let issued = match preview {
            Some(preview) => preview.next_key(namespace, Some(&existing)),
            None => self.sequencer.next_key(namespace, Some(&existing)),
        };

        let directory = directory.trim_end_matches('/');
        match issued {
            Ok(issued) => {
                let file_name = file_name_for(&issued.key, suffix);
                let path = if directory.is_empty() {
                    file_name
                } else {
                    format!("{}/{}", directory, file_name)
                };
                tracing::debug!(namespace, key = %issued.key, origin = ?issued.origin, "ordered artifact keyed");
                Slot::Write(GeneratedArtifact::new(path, content.as_bytes()).force_overwrite(force_overwrite))
            }
            Err(err) => {
                tracing::warn!(namespace, error = %err, "could not issue sequence key");
                let placeholder = GeneratedArtifact::new(format!("{}/*_{}", directory, suffix), content.as_bytes());
                let absolute = self.writer.resolve(&placeholder.relative_path);
                Slot::Failed(WriteOutcome::failed(
                    &placeholder,
                    absolute,
                    format!("could not issue sequence key: {}", err),
                ))
            }
        }
    }

    fn conflicting_merge(&self, file: &str) -> WriteOutcome {
        let artifact = GeneratedArtifact::new(file, Vec::new());
        WriteOutcome::failed(
            &artifact,
            self.writer.resolve(file),
            "file is targeted by incompatible merges in one plan",
        )
    }

    fn apply_merge(
        &self,
        file: &str,
        pending: &PendingMerge,
        aggregates: &AggregateState,
        options: WriteOptions,
    ) -> WriteOutcome {
        // The target may sit under a differently-cased directory the writer
        // will reconcile; its content must be merged, never replaced.
        let located = self
            .writer
            .locate(file)
            .and_then(|located| match located {
                Some(path) => fs::read_to_string(&path)
                    .at_path(&path)
                    .map(|content| Some((path, content))),
                None => Ok(None),
            });
        let (absolute, existing) = match located {
            Ok(Some((path, content))) => (path, Some(content)),
            Ok(None) => (self.writer.resolve(file), None),
            Err(err) => {
                tracing::warn!(file, error = %err, "could not read merge target");
                return WriteOutcome::failed(
                    &GeneratedArtifact::new(file, Vec::new()),
                    self.writer.resolve(file),
                    err.to_string(),
                );
            }
        };

        let merged = match pending {
            PendingMerge::Routes(registrations) => {
                let mut current = existing.clone();
                for registration in registrations {
                    if let Some(next) = merge_route(&self.routes, current.as_deref(), registration) {
                        current = Some(next);
                    }
                }
                Ok(current.filter(|content| existing.as_ref() != Some(content)))
            }
            PendingMerge::Aggregate { scope } => {
                let report = order_with_report(aggregates.entities(scope));
                if report.approximate {
                    tracing::warn!(
                        scope = %scope,
                        unresolved = ?report.unresolved,
                        "aggregate order is approximate"
                    );
                }
                self.seeders.merge(file, existing.as_deref(), &report.entities)
            }
        };

        match merged {
            Ok(Some(content)) => self.writer.write(
                &GeneratedArtifact::new(file, content).force_overwrite(true),
                options,
            ),
            Ok(None) => WriteOutcome::unchanged(
                &GeneratedArtifact::new(file, existing.unwrap_or_default()),
                absolute,
            ),
            Err(err) => {
                tracing::warn!(file, error = %err, "merge failed");
                WriteOutcome::failed(
                    &GeneratedArtifact::new(file, existing.unwrap_or_default()),
                    absolute,
                    err.to_string(),
                )
            }
        }
    }
}
