// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Bounded concurrent analysis of pending items
//!
//! One task per item, gated by a semaphore sized from [`WorkerPoolConfig`].
//! A failing item never affects its siblings, and [`AnalysisOrchestrator::analyze_pending`]
//! only returns once every task has settled.

use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ai::{ReceiptAnalyzer, ReceiptInfo};
use crate::cache::{hash_file, ContentCache};
use crate::config::WorkerPoolConfig;
use crate::item::{ItemStatus, ItemStore};
use crate::naming::Namer;
use crate::{ReceiptError, Result};

/// Reason recorded on items whose analysis was cut short
pub const CANCELLED_REASON: &str = "analysis cancelled";

/// Emitted once per item when its analysis settles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemProgress {
    pub index: usize,
    pub name: String,
    pub status: ItemStatus,
}

/// Tally of one orchestration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub ready: usize,
    pub cached: usize,
    pub failed: usize,
}

impl AnalysisSummary {
    pub fn total(&self) -> usize {
        self.ready + self.cached + self.failed
    }

    fn record(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Ready => self.ready += 1,
            ItemStatus::Cached => self.cached += 1,
            _ => self.failed += 1,
        }
    }
}

struct Analyzed {
    info: ReceiptInfo,
    name: String,
    from_cache: bool,
}

/// Runs cache lookups, analyzer calls and naming for every pending item
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    cache: Arc<ContentCache>,
    namer: Arc<Namer>,
    analyzer: Arc<dyn ReceiptAnalyzer>,
    pool: WorkerPoolConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        cache: Arc<ContentCache>,
        namer: Arc<Namer>,
        analyzer: Arc<dyn ReceiptAnalyzer>,
        pool: WorkerPoolConfig,
    ) -> Self {
        Self {
            cache,
            namer,
            analyzer,
            pool,
        }
    }

    pub fn namer(&self) -> &Arc<Namer> {
        &self.namer
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Analyze every Pending item in `store`.
    ///
    /// Each item ends Ready, Cached or Error. Once `cancel` fires, items still
    /// waiting for a worker slot, or still talking to the analyzer, end as Error
    /// with [`CANCELLED_REASON`].
    pub async fn analyze_pending(
        &self,
        store: &ItemStore,
        cancel: &CancellationToken,
        progress: Option<UnboundedSender<ItemProgress>>,
    ) -> Result<AnalysisSummary> {
        let claimed = store.claim_pending()?;
        let mut summary = AnalysisSummary::default();
        if claimed.is_empty() {
            debug!("No pending items to analyze");
            return Ok(summary);
        }

        let workers = self.pool.max_concurrency();
        info!(
            "Analyzing {} files with {} ({} workers)",
            claimed.len(),
            self.analyzer.name(),
            workers
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = FuturesUnordered::new();

        for index in claimed {
            let this = self.clone();
            let store = store.clone();
            let cancel = cancel.clone();
            let sem = Arc::clone(&semaphore);
            let progress = progress.clone();

            let handle = tokio::spawn(async move {
                let outcome: Result<Analyzed> = async {
                    let _permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ReceiptError::Cancelled),
                        permit = sem.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return Err(ReceiptError::Cancelled),
                        },
                    };
                    if cancel.is_cancelled() {
                        return Err(ReceiptError::Cancelled);
                    }
                    this.analyze_item(&store, index, &cancel).await
                }
                .await;

                let status = settle(&store, index, outcome)?;
                if let Some(tx) = &progress {
                    let name = store
                        .get(index)?
                        .map(|i| i.original_name().to_string())
                        .unwrap_or_default();
                    let _ = tx.send(ItemProgress {
                        index,
                        name,
                        status,
                    });
                }
                Ok::<_, ReceiptError>(status)
            });

            tasks.push(handle.map(move |joined| (index, joined)));
        }

        while let Some((index, joined)) = tasks.next().await {
            match joined {
                Ok(Ok(status)) => summary.record(status),
                Ok(Err(e)) => {
                    error!("Failed to record result for item {}: {}", index, e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Analysis task for item {} aborted: {}", index, e);
                    let reason = format!("analysis task failed: {}", e);
                    if let Err(e) = store.update(index, |item| item.fail(reason)) {
                        warn!("Could not mark item {} as failed: {}", index, e);
                    }
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Analysis finished: {} ready, {} cached, {} failed",
            summary.ready, summary.cached, summary.failed
        );
        Ok(summary)
    }

    async fn analyze_item(
        &self,
        store: &ItemStore,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<Analyzed> {
        let item = store
            .get(index)?
            .ok_or_else(|| ReceiptError::Config(format!("no item at index {}", index)))?;
        let path = item.source_path().to_path_buf();

        let hash = match (self.cache.is_enabled(), item.content_hash()) {
            (false, _) => None,
            (true, Some(hash)) => Some(hash.to_string()),
            (true, None) => {
                let to_hash = path.clone();
                match tokio::task::spawn_blocking(move || hash_file(&to_hash)).await {
                    Ok(Ok(hash)) => {
                        store.update(index, |i| {
                            i.remember_hash(hash.clone());
                            Ok(())
                        })?;
                        Some(hash)
                    }
                    Ok(Err(e)) => {
                        debug!("Could not hash {:?}, skipping cache: {}", path, e);
                        None
                    }
                    Err(e) => {
                        warn!("Hash task for {:?} failed: {}", path, e);
                        None
                    }
                }
            }
        };

        if let Some(info) = hash.as_deref().and_then(|h| self.cache.lookup(h)) {
            debug!("Cache hit for {:?}", path);
            let name = self.namer.generate(item.original_name(), &info)?;
            return Ok(Analyzed {
                info,
                name,
                from_cache: true,
            });
        }

        debug!("Analyzing {:?}", path);
        let info = self.analyzer.analyze(&path, cancel).await?;

        if let Some(hash) = &hash {
            if let Err(e) = self.cache.store(hash, &info) {
                warn!("Failed to cache result for {:?}: {}", path, e);
            }
        }

        let name = self.namer.generate(item.original_name(), &info)?;
        Ok(Analyzed {
            info,
            name,
            from_cache: false,
        })
    }
}

/// Record the outcome of one analysis on its item
fn settle(store: &ItemStore, index: usize, outcome: Result<Analyzed>) -> Result<ItemStatus> {
    store.update(index, |item| match outcome {
        Ok(done) => {
            item.finish_analysis(done.info, done.name, done.from_cache)?;
            Ok(item.status())
        }
        Err(e) => {
            let reason = match e {
                ReceiptError::Cancelled => CANCELLED_REASON.to_string(),
                other => other.to_string(),
            };
            warn!("Analysis failed for {}: {}", item.original_name(), reason);
            item.fail(reason)?;
            Ok(ItemStatus::Error)
        }
    })
}
