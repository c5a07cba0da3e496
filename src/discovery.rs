// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Directory scanning for candidate files

use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{ReceiptError, Result};

/// A file found by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Canonical form of `path`, used to recognise one file reached by two spellings
    pub resolved: PathBuf,
    /// Name already has the `YYYYMMDD-<middle>-<rest>.<ext>` output shape
    pub pre_renamed: bool,
}

impl DiscoveredFile {
    /// Resolve `path` through the filesystem, keeping it as-is when that fails
    pub fn new(path: PathBuf, pre_renamed: bool) -> Self {
        let resolved = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        Self {
            path,
            resolved,
            pre_renamed,
        }
    }
}

/// Non-recursive scanner for one target extension
#[derive(Debug, Clone)]
pub struct Discovery {
    extension: String,
    processed_shape: Regex,
}

impl Discovery {
    pub fn new(extension: &str) -> Result<Self> {
        let extension = extension.trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(ReceiptError::Config("target extension is empty".to_string()));
        }

        let processed_shape = Regex::new(&format!(
            r"(?i)^\d{{8}}-.+-.+\.{}$",
            regex::escape(&extension)
        ))
        .map_err(|e| ReceiptError::Config(format!("invalid extension pattern: {}", e)))?;

        Ok(Self {
            extension,
            processed_shape,
        })
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether `filename` looks like the output of an earlier run
    pub fn is_already_processed(&self, filename: &str) -> bool {
        self.processed_shape.is_match(filename)
    }

    /// Whether `path` carries the target extension (any case)
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    /// Classify explicit paths (e.g. files handed over by a front end)
    pub fn classify<I>(&self, paths: I) -> Vec<DiscoveredFile>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for path in paths {
            if !path.is_file() || !self.matches_extension(&path) || !should_process(&path) {
                continue;
            }

            let pre_renamed = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| self.is_already_processed(n));

            let file = DiscoveredFile::new(path, pre_renamed);
            if !seen.insert(file.resolved.clone()) {
                debug!("Skipping duplicate path: {:?}", file.path);
                continue;
            }
            files.push(file);
        }

        files
    }

    /// List immediate entries of `dir` with the target extension, sorted by path
    pub fn scan(&self, dir: &Path) -> Result<Vec<DiscoveredFile>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        paths.sort();

        let files = self.classify(paths);
        debug!(
            "Scanned {:?}: {} candidates ({} already renamed)",
            dir,
            files.len(),
            files.iter().filter(|f| f.pre_renamed).count()
        );
        Ok(files)
    }
}

/// Check if a file should be considered at all
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files (including macOS `._` resource forks)
    if filename.starts_with('.') {
        return false;
    }

    // Skip partial downloads
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    !temp_extensions.iter().any(|ext| filename.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_processed_shape() {
        let d = Discovery::new("pdf").unwrap();
        assert!(d.is_already_processed("20250115-Cursor-Receipt-001.pdf"));
        assert!(d.is_already_processed("20250115-Cursor-Receipt-001.PDF"));
        assert!(d.is_already_processed("20250115-a-b.pdf"));
        assert!(!d.is_already_processed("Receipt-001.pdf"));
        assert!(!d.is_already_processed("2025011-Cursor-x.pdf"));
        assert!(!d.is_already_processed("20250115-Cursor.pdf"));
        assert!(!d.is_already_processed("20250115--.pdf"));
        assert!(!d.is_already_processed("20250115-Cursor-x.png"));
    }

    #[test]
    fn test_should_process() {
        assert!(should_process(Path::new("/r/receipt.pdf")));
        assert!(!should_process(Path::new("/r/.hidden.pdf")));
        assert!(!should_process(Path::new("/r/._receipt.pdf")));
        assert!(!should_process(Path::new("/r/receipt.pdf.part")));
    }

    #[test]
    fn test_scan_classifies_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Receipt-001.pdf"), b"a").unwrap();
        fs::write(dir.path().join("UPPER.PDF"), b"b").unwrap();
        fs::write(dir.path().join("20250115-Cursor-Receipt-000.pdf"), b"c").unwrap();
        fs::write(dir.path().join("notes.txt"), b"d").unwrap();
        fs::write(dir.path().join(".hidden.pdf"), b"e").unwrap();
        fs::create_dir(dir.path().join("nested.pdf")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("deep.pdf"), b"f").unwrap();

        let d = Discovery::new("pdf").unwrap();
        let files = d.scan(dir.path()).unwrap();

        let names: Vec<(String, bool)> = files
            .iter()
            .map(|f| {
                (
                    f.path.file_name().unwrap().to_string_lossy().into_owned(),
                    f.pre_renamed,
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("20250115-Cursor-Receipt-000.pdf".to_string(), true),
                ("Receipt-001.pdf".to_string(), false),
                ("UPPER.PDF".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_classify_dedups_resolved_paths() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        fs::write(&file, b"a").unwrap();
        let dotted = dir.path().join(".").join("a.pdf");

        let d = Discovery::new(".pdf").unwrap();
        let files = d.classify(vec![file.clone(), dotted]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, file);
    }

    #[test]
    fn test_empty_extension_rejected() {
        assert!(Discovery::new("").is_err());
    }
}
