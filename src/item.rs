// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-file processing state and the shared collection of items for a run
//!
//! ```text
//! Pending ──► Analyzing ──► Ready  ──► Renamed
//!    │            │         Cached ──► Skipped (name unchanged)
//!    │            └──► Error  ◄────────┘ (collision / fs failure)
//!    └──► Skipped (already-processed name, at discovery)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ai::ReceiptInfo;
use crate::discovery::DiscoveredFile;
use crate::{ReceiptError, Result};

/// Processing status of a discovered file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Analyzing,
    Ready,
    Cached,
    Renamed,
    Error,
    Skipped,
}

impl ItemStatus {
    /// No further transitions happen within the run
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Renamed | ItemStatus::Error | ItemStatus::Skipped)
    }

    /// Has a computed name and may be handed to the renamer
    pub fn is_renamable(self) -> bool {
        matches!(self, ItemStatus::Ready | ItemStatus::Cached)
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Analyzing => "analyzing",
            ItemStatus::Ready => "ready",
            ItemStatus::Cached => "cached",
            ItemStatus::Renamed => "renamed",
            ItemStatus::Error => "error",
            ItemStatus::Skipped => "skipped",
        }
    }
}

/// One discovered candidate file.
///
/// `computed_name` is present iff the status is Ready or Cached, and
/// `failure_reason` is present iff the status is Error. Fields are only
/// reachable through the transition methods so these hold.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    id: usize,
    source_path: PathBuf,
    #[serde(skip)]
    resolved_path: PathBuf,
    original_name: String,
    #[serde(skip)]
    content_hash: Option<String>,
    status: ItemStatus,
    extracted: Option<ReceiptInfo>,
    computed_name: Option<String>,
    failure_reason: Option<String>,
    selected: bool,
    pre_renamed: bool,
    renamed_to: Option<PathBuf>,
}

impl Item {
    /// Create an item at discovery time.
    ///
    /// Already-processed files start as Skipped and unselected.
    pub fn discovered(id: usize, source_path: PathBuf, pre_renamed: bool) -> Self {
        let original_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id,
            resolved_path: source_path.clone(),
            source_path,
            original_name,
            content_hash: None,
            status: if pre_renamed {
                ItemStatus::Skipped
            } else {
                ItemStatus::Pending
            },
            extracted: None,
            computed_name: None,
            failure_reason: None,
            selected: !pre_renamed,
            pre_renamed,
            renamed_to: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn extracted(&self) -> Option<&ReceiptInfo> {
        self.extracted.as_ref()
    }

    pub fn computed_name(&self) -> Option<&str> {
        self.computed_name.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_pre_renamed(&self) -> bool {
        self.pre_renamed
    }

    /// Destination path after a successful rename
    pub fn renamed_to(&self) -> Option<&Path> {
        self.renamed_to.as_deref()
    }

    /// Memoize the content hash for the rest of the run
    pub fn remember_hash(&mut self, hash: String) {
        self.content_hash = Some(hash);
    }

    fn transition(&mut self, allowed: &[ItemStatus], to: ItemStatus) -> Result<()> {
        if !allowed.contains(&self.status) {
            return Err(ReceiptError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Pending -> Analyzing
    pub fn begin_analysis(&mut self) -> Result<()> {
        self.transition(&[ItemStatus::Pending], ItemStatus::Analyzing)
    }

    /// Analyzing -> Cached / Ready
    pub fn finish_analysis(
        &mut self,
        info: ReceiptInfo,
        computed_name: String,
        from_cache: bool,
    ) -> Result<()> {
        let to = if from_cache {
            ItemStatus::Cached
        } else {
            ItemStatus::Ready
        };
        self.transition(&[ItemStatus::Analyzing], to)?;
        self.extracted = Some(info);
        self.computed_name = Some(computed_name);
        self.failure_reason = None;
        Ok(())
    }

    /// Analyzing / Ready / Cached -> Error
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(
            &[ItemStatus::Analyzing, ItemStatus::Ready, ItemStatus::Cached],
            ItemStatus::Error,
        )?;
        self.computed_name = None;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Ready / Cached -> Renamed
    pub fn mark_renamed(&mut self, destination: PathBuf) -> Result<()> {
        self.transition(&[ItemStatus::Ready, ItemStatus::Cached], ItemStatus::Renamed)?;
        self.computed_name = None;
        self.renamed_to = Some(destination);
        Ok(())
    }

    /// Ready / Cached -> Skipped, when the computed name equals the original
    pub fn mark_unchanged(&mut self) -> Result<()> {
        self.transition(&[ItemStatus::Ready, ItemStatus::Cached], ItemStatus::Skipped)?;
        self.computed_name = None;
        Ok(())
    }

    /// Replace the computed name after a template change (Ready / Cached only)
    pub fn rename_target(&mut self, computed_name: String) -> Result<()> {
        if !self.status.is_renamable() {
            return Err(ReceiptError::InvalidTransition {
                from: self.status,
                to: self.status,
            });
        }
        self.computed_name = Some(computed_name);
        Ok(())
    }
}

/// Counts of items per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub analyzing: usize,
    pub ready: usize,
    pub cached: usize,
    pub renamed: usize,
    pub error: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending
            + self.analyzing
            + self.ready
            + self.cached
            + self.renamed
            + self.error
            + self.skipped
    }
}

/// Shared, mutex-guarded collection of items (thread-safe wrapper)
///
/// Callers only ever see clones; every mutation goes through a method here.
#[derive(Clone, Default)]
pub struct ItemStore {
    items: Arc<Mutex<Vec<Item>>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_items(&self) -> Result<MutexGuard<'_, Vec<Item>>> {
        self.items
            .lock()
            .map_err(|_| ReceiptError::Config("Item store lock poisoned".to_string()))
    }

    /// Add newly discovered paths, skipping files already present under any spelling.
    ///
    /// Returns the number of items added.
    pub fn add_discovered<I>(&self, discovered: I) -> Result<usize>
    where
        I: IntoIterator<Item = DiscoveredFile>,
    {
        let mut items = self.lock_items()?;
        let mut known: HashSet<PathBuf> =
            items.iter().map(|i| i.resolved_path.clone()).collect();

        let before = items.len();
        for file in discovered {
            if known.insert(file.resolved.clone()) {
                let id = items.len();
                let mut item = Item::discovered(id, file.path, file.pre_renamed);
                item.resolved_path = file.resolved;
                items.push(item);
            }
        }
        Ok(items.len() - before)
    }

    /// Drop every item
    pub fn clear(&self) -> Result<()> {
        self.lock_items()?.clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock_items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock_items()?.is_empty())
    }

    /// Copy of all items in discovery order
    pub fn snapshot(&self) -> Result<Vec<Item>> {
        Ok(self.lock_items()?.clone())
    }

    /// Copy of a single item
    pub fn get(&self, index: usize) -> Result<Option<Item>> {
        Ok(self.lock_items()?.get(index).cloned())
    }

    /// Apply `f` to one item under the store lock
    pub fn update<R, F>(&self, index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut Item) -> Result<R>,
    {
        let mut items = self.lock_items()?;
        let item = items.get_mut(index).ok_or_else(|| {
            ReceiptError::Config(format!("no item at index {}", index))
        })?;
        f(item)
    }

    /// Apply `f` to every item under one lock acquisition
    pub fn update_all<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Item),
    {
        for item in self.lock_items()?.iter_mut() {
            f(item);
        }
        Ok(())
    }

    /// Move every Pending item to Analyzing and return their indices
    pub fn claim_pending(&self) -> Result<Vec<usize>> {
        let mut items = self.lock_items()?;
        let mut claimed = Vec::new();
        for (index, item) in items.iter_mut().enumerate() {
            if item.status == ItemStatus::Pending {
                item.begin_analysis()?;
                claimed.push(index);
            }
        }
        Ok(claimed)
    }

    /// Indices of selected items that have a computed name
    pub fn selected_renamable(&self) -> Result<Vec<usize>> {
        Ok(self
            .lock_items()?
            .iter()
            .enumerate()
            .filter(|(_, i)| i.selected && i.status.is_renamable())
            .map(|(index, _)| index)
            .collect())
    }

    /// Flip selection of one item, returning the new state
    pub fn toggle(&self, index: usize) -> Result<bool> {
        self.update(index, |item| {
            item.selected = !item.selected;
            Ok(item.selected)
        })
    }

    /// Select every Ready / Cached item
    pub fn select_all(&self) -> Result<()> {
        self.update_all(|item| {
            if item.status.is_renamable() {
                item.selected = true;
            }
        })
    }

    pub fn deselect_all(&self) -> Result<()> {
        self.update_all(|item| item.selected = false)
    }

    pub fn selected_count(&self) -> Result<usize> {
        Ok(self.lock_items()?.iter().filter(|i| i.selected).count())
    }

    pub fn count(&self, status: ItemStatus) -> Result<usize> {
        Ok(self
            .lock_items()?
            .iter()
            .filter(|i| i.status == status)
            .count())
    }

    /// Per-status tally of the whole run
    pub fn counts(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for item in self.lock_items()?.iter() {
            let slot = match item.status {
                ItemStatus::Pending => &mut counts.pending,
                ItemStatus::Analyzing => &mut counts.analyzing,
                ItemStatus::Ready => &mut counts.ready,
                ItemStatus::Cached => &mut counts.cached,
                ItemStatus::Renamed => &mut counts.renamed,
                ItemStatus::Error => &mut counts.error,
                ItemStatus::Skipped => &mut counts.skipped,
            };
            *slot += 1;
        }
        Ok(counts)
    }

    /// First item with a computed name, for showing what a template produces
    pub fn example_item(&self) -> Result<Option<Item>> {
        Ok(self
            .lock_items()?
            .iter()
            .find(|i| i.status.is_renamable())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(path: &str, pre_renamed: bool) -> DiscoveredFile {
        DiscoveredFile::new(PathBuf::from(path), pre_renamed)
    }

    fn info() -> ReceiptInfo {
        ReceiptInfo {
            date: "20250115".to_string(),
            service: "Cursor".to_string(),
        }
    }

    fn analyzed(from_cache: bool) -> Item {
        let mut item = Item::discovered(0, PathBuf::from("/r/Receipt-001.pdf"), false);
        item.begin_analysis().unwrap();
        item.finish_analysis(info(), "20250115-Cursor-Receipt-001.pdf".to_string(), from_cache)
            .unwrap();
        item
    }

    #[test]
    fn test_discovered_defaults() {
        let item = Item::discovered(3, PathBuf::from("/r/Receipt-001.pdf"), false);
        assert_eq!(item.status(), ItemStatus::Pending);
        assert_eq!(item.original_name(), "Receipt-001.pdf");
        assert!(item.is_selected());
        assert!(!item.is_pre_renamed());

        let skipped = Item::discovered(4, PathBuf::from("/r/20250115-Cursor-x.pdf"), true);
        assert_eq!(skipped.status(), ItemStatus::Skipped);
        assert!(!skipped.is_selected());
        assert!(skipped.is_pre_renamed());
    }

    #[test]
    fn test_analysis_path_sets_name() {
        let ready = analyzed(false);
        assert_eq!(ready.status(), ItemStatus::Ready);
        assert_eq!(ready.computed_name(), Some("20250115-Cursor-Receipt-001.pdf"));
        assert_eq!(ready.failure_reason(), None);

        let cached = analyzed(true);
        assert_eq!(cached.status(), ItemStatus::Cached);
    }

    #[test]
    fn test_failure_clears_name_and_records_reason() {
        let mut item = analyzed(false);
        item.fail("collision").unwrap();
        assert_eq!(item.status(), ItemStatus::Error);
        assert_eq!(item.computed_name(), None);
        assert_eq!(item.failure_reason(), Some("collision"));
        assert!(item.status().is_terminal());
    }

    #[test]
    fn test_rename_outcomes() {
        let mut renamed = analyzed(true);
        renamed
            .mark_renamed(PathBuf::from("/r/20250115-Cursor-Receipt-001.pdf"))
            .unwrap();
        assert_eq!(renamed.status(), ItemStatus::Renamed);
        assert_eq!(renamed.computed_name(), None);
        assert!(renamed.renamed_to().is_some());

        let mut unchanged = analyzed(false);
        unchanged.mark_unchanged().unwrap();
        assert_eq!(unchanged.status(), ItemStatus::Skipped);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut item = Item::discovered(0, PathBuf::from("/r/a.pdf"), false);
        assert!(item.finish_analysis(info(), "x.pdf".to_string(), false).is_err());
        assert!(item.mark_renamed(PathBuf::from("/r/x.pdf")).is_err());
        assert!(item.fail("nope").is_err());
        assert_eq!(item.status(), ItemStatus::Pending);

        let mut skipped = Item::discovered(1, PathBuf::from("/r/20250101-a-b.pdf"), true);
        assert!(matches!(
            skipped.begin_analysis(),
            Err(ReceiptError::InvalidTransition {
                from: ItemStatus::Skipped,
                to: ItemStatus::Analyzing
            })
        ));

        let mut renamed = analyzed(false);
        renamed.mark_renamed(PathBuf::from("/r/new.pdf")).unwrap();
        assert!(renamed.rename_target("other.pdf".to_string()).is_err());
    }

    #[test]
    fn test_store_dedups_and_claims_pending() {
        let store = ItemStore::new();
        let added = store
            .add_discovered(vec![
                found("/r/a.pdf", false),
                found("/r/20250101-x-y.pdf", true),
                found("/r/a.pdf", false),
            ])
            .unwrap();
        assert_eq!(added, 2);

        let claimed = store.claim_pending().unwrap();
        assert_eq!(claimed, vec![0]);
        assert_eq!(store.count(ItemStatus::Analyzing).unwrap(), 1);
        assert_eq!(store.count(ItemStatus::Skipped).unwrap(), 1);

        // Nothing left to claim on a second pass
        assert!(store.claim_pending().unwrap().is_empty());

        assert_eq!(store.len().unwrap(), 2);
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_store_dedups_across_calls_by_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"a").unwrap();

        let store = ItemStore::new();
        let first = store.add_discovered(vec![DiscoveredFile::new(file.clone(), false)]);
        assert_eq!(first.unwrap(), 1);

        // Same file, different spelling, separate call
        let dotted = dir.path().join(".").join("a.pdf");
        let second = store.add_discovered(vec![DiscoveredFile::new(dotted, false)]);
        assert_eq!(second.unwrap(), 0);

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(0).unwrap().unwrap().source_path(), file.as_path());
    }

    #[test]
    fn test_selection_operations() {
        let store = ItemStore::new();
        store
            .add_discovered(vec![
                found("/r/a.pdf", false),
                found("/r/b.pdf", false),
                found("/r/20250101-x-y.pdf", true),
            ])
            .unwrap();
        for index in store.claim_pending().unwrap() {
            store
                .update(index, |item| {
                    item.finish_analysis(info(), format!("n{}.pdf", index), false)
                })
                .unwrap();
        }

        assert_eq!(store.selected_count().unwrap(), 2);
        assert!(!store.toggle(0).unwrap());
        assert_eq!(store.selected_renamable().unwrap(), vec![1]);

        store.deselect_all().unwrap();
        assert_eq!(store.selected_count().unwrap(), 0);

        store.select_all().unwrap();
        assert_eq!(store.selected_renamable().unwrap(), vec![0, 1]);
        // Pre-renamed items never join a select-all
        assert!(!store.get(2).unwrap().unwrap().is_selected());

        let counts = store.counts().unwrap();
        assert_eq!(counts.ready, 2);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(store.example_item().unwrap().unwrap().id(), 0);
    }
}
