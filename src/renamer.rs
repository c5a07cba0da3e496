// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Collision-checked renames within a file's own directory
//!
//! The existence check and the move are two steps, so a second process writing
//! into the same directory between them can still race us. Single-process use
//! is assumed.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{ReceiptError, Result};

/// What a rename did, or would do in preview
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// File moved to the contained path
    Renamed(PathBuf),
    /// Computed name equals the current name; nothing touched
    Unchanged,
    /// Preview only: the file would move to the contained path
    WouldRename(PathBuf),
}

/// Renamer that never overwrites an existing file
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeRenamer;

impl SafeRenamer {
    pub fn new() -> Self {
        Self
    }

    /// Destination for `new_name` next to `source`
    pub fn destination(source: &Path, new_name: &str) -> Result<PathBuf> {
        if new_name.is_empty() || new_name.contains(['/', '\\']) {
            return Err(ReceiptError::Template(format!(
                "invalid file name: {:?}",
                new_name
            )));
        }
        let parent = source.parent().ok_or_else(|| {
            ReceiptError::Config("Cannot determine parent directory".to_string())
        })?;
        Ok(parent.join(new_name))
    }

    /// Check everything a rename would check, without touching the filesystem
    pub fn plan(&self, source: &Path, new_name: &str) -> Result<RenameOutcome> {
        if Self::is_noop(source, new_name) {
            return Ok(RenameOutcome::Unchanged);
        }
        let destination = Self::destination(source, new_name)?;
        Self::ensure_free(source, &destination)?;
        Ok(RenameOutcome::WouldRename(destination))
    }

    /// Move `source` to `new_name` in the same directory.
    ///
    /// Fails with [`ReceiptError::Collision`] and leaves the filesystem untouched
    /// when the destination already exists.
    pub fn rename(&self, source: &Path, new_name: &str) -> Result<RenameOutcome> {
        if Self::is_noop(source, new_name) {
            debug!("Name unchanged, skipping: {:?}", source);
            return Ok(RenameOutcome::Unchanged);
        }

        let destination = Self::destination(source, new_name)?;
        Self::ensure_free(source, &destination)?;

        std::fs::rename(source, &destination)?;
        info!("Renamed {:?} -> {:?}", source, destination);

        Ok(RenameOutcome::Renamed(destination))
    }

    fn is_noop(source: &Path, new_name: &str) -> bool {
        source
            .file_name()
            .is_some_and(|current| current == std::ffi::OsStr::new(new_name))
    }

    fn ensure_free(source: &Path, destination: &Path) -> Result<()> {
        if std::fs::symlink_metadata(destination).is_err() {
            return Ok(());
        }

        // A case-only change on a case-insensitive filesystem resolves to the source itself
        let same_file = match (
            std::fs::canonicalize(source),
            std::fs::canonicalize(destination),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if same_file {
            return Ok(());
        }

        Err(ReceiptError::Collision(destination.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_rename_moves_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Receipt-001.pdf");
        fs::write(&source, b"receipt").unwrap();

        let outcome = SafeRenamer::new()
            .rename(&source, "20250115-Cursor-Receipt-001.pdf")
            .unwrap();

        let expected = dir.path().join("20250115-Cursor-Receipt-001.pdf");
        assert_eq!(outcome, RenameOutcome::Renamed(expected.clone()));
        assert!(!source.exists());
        assert_eq!(fs::read(&expected).unwrap(), b"receipt");
    }

    #[test]
    fn test_same_name_is_noop() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("same.pdf");
        fs::write(&source, b"x").unwrap();

        let outcome = SafeRenamer::new().rename(&source, "same.pdf").unwrap();
        assert_eq!(outcome, RenameOutcome::Unchanged);
        assert!(source.exists());
    }

    #[test]
    fn test_collision_leaves_filesystem_untouched() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.pdf");
        let existing = dir.path().join("existing.pdf");
        fs::write(&source, b"source").unwrap();
        fs::write(&existing, b"existing").unwrap();

        let err = SafeRenamer::new().rename(&source, "existing.pdf").unwrap_err();
        assert!(matches!(err, ReceiptError::Collision(ref p) if p == &existing));
        assert_eq!(fs::read(&source).unwrap(), b"source");
        assert_eq!(fs::read(&existing).unwrap(), b"existing");
    }

    #[test]
    fn test_plan_does_not_mutate() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.pdf");
        fs::write(&source, b"a").unwrap();
        fs::write(dir.path().join("taken.pdf"), b"t").unwrap();

        let renamer = SafeRenamer::new();
        assert_eq!(
            renamer.plan(&source, "b.pdf").unwrap(),
            RenameOutcome::WouldRename(dir.path().join("b.pdf"))
        );
        assert!(matches!(
            renamer.plan(&source, "taken.pdf"),
            Err(ReceiptError::Collision(_))
        ));
        assert!(source.exists());
        assert!(!dir.path().join("b.pdf").exists());
    }

    #[test]
    fn test_rejects_separator_in_name() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.pdf");
        fs::write(&source, b"a").unwrap();
        assert!(SafeRenamer::new().rename(&source, "../escape.pdf").is_err());
        assert!(source.exists());
    }

    #[test]
    fn test_missing_source_is_filesystem_error() {
        let dir = tempdir().unwrap();
        let result = SafeRenamer::new().rename(&dir.path().join("gone.pdf"), "new.pdf");
        assert!(matches!(result, Err(ReceiptError::FileSystem(_))));
    }
}
