// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! One pass over a directory: discover, analyze, rename
//!
//! The runner owns the item collection for the run. Front ends drive it either
//! through [`BatchRunner::run`] or step by step, changing the selection or the
//! template between the analysis and rename passes.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::ReceiptAnalyzer;
use crate::cache::ContentCache;
use crate::config::AppConfig;
use crate::discovery::Discovery;
use crate::history::PatternHistory;
use crate::item::{ItemStatus, ItemStore, StatusCounts};
use crate::naming::Namer;
use crate::orchestrator::{AnalysisOrchestrator, AnalysisSummary, ItemProgress};
use crate::renamer::{RenameOutcome, SafeRenamer};
use crate::{ReceiptError, Result};

/// Aggregate counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub renamed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl BatchResult {
    /// Everything that was neither renamed nor errored counts as skipped
    pub fn from_counts(counts: &StatusCounts) -> Self {
        let total = counts.total();
        Self {
            total,
            renamed: counts.renamed,
            errored: counts.error,
            skipped: total - counts.renamed - counts.error,
        }
    }

    /// 0: no errors; 1: partial failure; 2: errors and nothing renamed
    pub fn exit_code(&self) -> i32 {
        match (self.errored, self.renamed) {
            (0, _) => 0,
            (_, 0) => 2,
            _ => 1,
        }
    }
}

/// What happened (or would happen) to one selected item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    Renamed { to: String },
    WouldRename { to: String },
    Unchanged,
    Collision { target: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub index: usize,
    pub original_name: String,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

/// Result of a rename pass. In preview mode `result.renamed` counts the files
/// that would be renamed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    pub dry_run: bool,
    pub entries: Vec<ReportEntry>,
    pub result: BatchResult,
}

impl RenameReport {
    pub fn count(&self, matches: impl Fn(&EntryOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| matches(&e.outcome)).count()
    }
}

/// Drives discovery, analysis and renaming over a single directory
pub struct BatchRunner {
    directory: PathBuf,
    discovery: Discovery,
    store: ItemStore,
    orchestrator: AnalysisOrchestrator,
    renamer: SafeRenamer,
    dry_run: bool,
    history: Option<PatternHistory>,
}

impl BatchRunner {
    pub fn new(directory: PathBuf, discovery: Discovery, orchestrator: AnalysisOrchestrator) -> Self {
        Self {
            directory,
            discovery,
            store: ItemStore::new(),
            orchestrator,
            renamer: SafeRenamer::new(),
            dry_run: false,
            history: None,
        }
    }

    /// Build a runner with the cache, template, extension and pool from `config`
    pub fn from_config(
        directory: PathBuf,
        config: &AppConfig,
        analyzer: Arc<dyn ReceiptAnalyzer>,
    ) -> Result<Self> {
        let cache = Arc::new(ContentCache::new(&config.cache)?);
        let namer = Arc::new(Namer::new(&config.format.service_pattern)?);
        let discovery = Discovery::new(&config.format.extension)?;
        let orchestrator =
            AnalysisOrchestrator::new(cache, namer, analyzer, config.ai.worker_pool());
        Ok(Self::new(directory, discovery, orchestrator))
    }

    /// Preview mode: plan renames without touching the filesystem
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Record accepted template fragments in `history`
    pub fn with_history(mut self, history: PatternHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    pub fn namer(&self) -> &Arc<Namer> {
        self.orchestrator.namer()
    }

    /// Scan the directory and add new candidates; returns how many were added
    pub fn discover(&self) -> Result<usize> {
        let found = self.discovery.scan(&self.directory)?;
        let added = self.store.add_discovered(found)?;
        info!(
            "Found {} new files in {:?} ({} already renamed)",
            added,
            self.directory,
            self.store.count(ItemStatus::Skipped)?
        );
        Ok(added)
    }

    /// Add explicit paths, classified the same way a scan would
    pub fn add_paths<I>(&self, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.store.add_discovered(self.discovery.classify(paths))
    }

    /// Analyze every Pending item
    pub async fn analyze(
        &self,
        cancel: &CancellationToken,
        progress: Option<UnboundedSender<ItemProgress>>,
    ) -> Result<AnalysisSummary> {
        self.orchestrator
            .analyze_pending(&self.store, cancel, progress)
            .await
    }

    /// Rename (or, in preview mode, plan) every selected Ready / Cached item
    pub fn rename_selected(&self) -> Result<RenameReport> {
        let report = if self.dry_run {
            self.plan_selected()?
        } else {
            self.apply_selected()?
        };

        info!(
            "{}: {} renamed, {} errors, {} skipped",
            if self.dry_run { "Preview" } else { "Done" },
            report.result.renamed,
            report.result.errored,
            report.result.skipped
        );
        Ok(report)
    }

    fn apply_selected(&self) -> Result<RenameReport> {
        let mut entries = Vec::new();

        for index in self.store.selected_renamable()? {
            let Some(item) = self.store.get(index)? else {
                continue;
            };
            let Some(new_name) = item.computed_name().map(str::to_string) else {
                continue;
            };

            let outcome = match self.renamer.rename(item.source_path(), &new_name) {
                Ok(RenameOutcome::Renamed(destination)) => {
                    self.store
                        .update(index, |i| i.mark_renamed(destination.clone()))?;
                    EntryOutcome::Renamed { to: new_name }
                }
                Ok(RenameOutcome::Unchanged) | Ok(RenameOutcome::WouldRename(_)) => {
                    self.store.update(index, |i| i.mark_unchanged())?;
                    EntryOutcome::Unchanged
                }
                Err(ReceiptError::Collision(target)) => {
                    let reason = format!("{} already exists", target.display());
                    warn!("Skipping {}: {}", item.original_name(), reason);
                    self.store.update(index, |i| i.fail(reason))?;
                    EntryOutcome::Collision {
                        target: display_name(&target),
                    }
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!("Failed to rename {}: {}", item.original_name(), reason);
                    self.store.update(index, |i| i.fail(reason.clone()))?;
                    EntryOutcome::Failed { reason }
                }
            };

            entries.push(ReportEntry {
                index,
                original_name: item.original_name().to_string(),
                outcome,
            });
        }

        Ok(RenameReport {
            dry_run: false,
            entries,
            result: self.result()?,
        })
    }

    fn plan_selected(&self) -> Result<RenameReport> {
        let mut entries = Vec::new();
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for index in self.store.selected_renamable()? {
            let Some(item) = self.store.get(index)? else {
                continue;
            };
            let Some(new_name) = item.computed_name().map(str::to_string) else {
                continue;
            };

            let outcome = match self.renamer.plan(item.source_path(), &new_name) {
                // Two items planned onto one name collide on the real run
                Ok(RenameOutcome::WouldRename(destination)) if !claimed.insert(destination.clone()) => {
                    EntryOutcome::Collision {
                        target: display_name(&destination),
                    }
                }
                Ok(RenameOutcome::WouldRename(_)) | Ok(RenameOutcome::Renamed(_)) => {
                    EntryOutcome::WouldRename { to: new_name }
                }
                Ok(RenameOutcome::Unchanged) => EntryOutcome::Unchanged,
                Err(ReceiptError::Collision(target)) => EntryOutcome::Collision {
                    target: display_name(&target),
                },
                Err(e) => EntryOutcome::Failed {
                    reason: e.to_string(),
                },
            };
            debug!("Planned {}: {:?}", item.original_name(), outcome);

            entries.push(ReportEntry {
                index,
                original_name: item.original_name().to_string(),
                outcome,
            });
        }

        let report = RenameReport {
            dry_run: true,
            result: BatchResult::default(),
            entries,
        };
        let counts = self.store.counts()?;
        let total = counts.total();
        let renamed = report.count(|o| matches!(o, EntryOutcome::WouldRename { .. }));
        let errored = counts.error
            + report.count(|o| {
                matches!(o, EntryOutcome::Collision { .. } | EntryOutcome::Failed { .. })
            });

        Ok(RenameReport {
            result: BatchResult {
                total,
                renamed,
                errored,
                skipped: total.saturating_sub(renamed + errored),
            },
            ..report
        })
    }

    /// Full pass: discover, analyze, then rename the default selection.
    ///
    /// A cancelled run skips the rename pass.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        progress: Option<UnboundedSender<ItemProgress>>,
    ) -> Result<RenameReport> {
        self.discover()?;
        self.analyze(cancel, progress).await?;

        if cancel.is_cancelled() {
            warn!("Run cancelled, no files renamed");
            return Ok(RenameReport {
                dry_run: self.dry_run,
                entries: Vec::new(),
                result: self.result()?,
            });
        }

        self.rename_selected()
    }

    /// Swap the naming template and recompute names of analyzed items.
    ///
    /// An invalid fragment is rejected and nothing changes. Returns how many
    /// names were regenerated.
    pub fn update_template(&self, fragment: &str) -> Result<usize> {
        let namer = self.orchestrator.namer();
        namer.update_template(fragment)?;

        let mut regenerated = 0;
        for (index, item) in self.store.snapshot()?.into_iter().enumerate() {
            if !item.status().is_renamable() {
                continue;
            }
            let Some(info) = item.extracted() else {
                continue;
            };

            match namer.generate(item.original_name(), info) {
                Ok(name) => {
                    self.store.update(index, |i| i.rename_target(name))?;
                    regenerated += 1;
                }
                Err(e) => {
                    warn!("Could not regenerate name for {}: {}", item.original_name(), e);
                    self.store.update(index, |i| i.fail(e.to_string()))?;
                }
            }
        }

        if let Some(history) = &self.history {
            if let Err(e) = history.add(fragment) {
                warn!("Failed to record pattern history: {}", e);
            }
        }

        debug!("Regenerated {} names for fragment {:?}", regenerated, fragment);
        Ok(regenerated)
    }

    /// Counts derived from the current item states
    pub fn result(&self) -> Result<BatchResult> {
        Ok(BatchResult::from_counts(&self.store.counts()?))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
