// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Recently used service patterns, most recent first

use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;

/// Maximum number of patterns kept
pub const MAX_PATTERNS: usize = 20;

/// Pattern history stored as a JSON array of strings
pub struct PatternHistory {
    path: PathBuf,
}

impl PatternHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// All remembered patterns, newest first.
    ///
    /// A missing file is an empty history; an unreadable one is logged and treated the same.
    pub fn get(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let data = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&data) {
            Ok(patterns) => Ok(patterns),
            Err(e) => {
                tracing::warn!("Failed to parse pattern history {:?}: {}", self.path, e);
                Ok(Vec::new())
            }
        }
    }

    /// Move `pattern` to the front, dropping duplicates and the oldest overflow.
    ///
    /// Blank patterns are ignored.
    pub fn add(&self, pattern: &str) -> Result<()> {
        if pattern.trim().is_empty() {
            return Ok(());
        }

        let mut patterns = self.get()?;
        patterns.retain(|p| p != pattern);
        patterns.insert(0, pattern.to_string());
        patterns.truncate(MAX_PATTERNS);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&patterns)?)?;
        Ok(())
    }

    /// Forget every pattern
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
