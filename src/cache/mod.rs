// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Content-addressed cache of analysis results
//!
//! One JSON file per SHA-256 of the analyzed file's bytes. Entries are independent
//! of path and filename, so moved or renamed files still hit, and edited files miss.
//! Expiry is checked lazily on lookup; there is no background sweeper.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::ai::ReceiptInfo;
use crate::config::CacheConfig;
use crate::Result;

const ENTRY_EXTENSION: &str = "json";
const BUFFER_SIZE: usize = 8192;

/// Persisted cache record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub analyzed_at: DateTime<Utc>,
    pub result: ReceiptInfo,
}

/// Analysis cache keyed by file content
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
    enabled: bool,
    ttl_days: u32,
}

impl ContentCache {
    /// Create the cache described by `config`
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_dir(config.resolved_dir(), config.enabled, config.ttl_days)
    }

    /// Create a cache rooted at `dir`; the directory is created when enabled
    pub fn with_dir(dir: PathBuf, enabled: bool, ttl_days: u32) -> Result<Self> {
        if enabled {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            enabled,
            ttl_days,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", hash, ENTRY_EXTENSION))
    }

    /// Look up the result for the file at `path`.
    ///
    /// Unreadable files and corrupt entries are misses.
    pub fn get(&self, path: &Path) -> Option<ReceiptInfo> {
        if !self.enabled {
            return None;
        }
        let hash = hash_file(path).ok()?;
        self.lookup(&hash)
    }

    /// Look up by precomputed content hash
    pub fn lookup(&self, hash: &str) -> Option<ReceiptInfo> {
        if !self.enabled {
            return None;
        }

        let entry_path = self.entry_path(hash);
        let data = fs::read_to_string(&entry_path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Ignoring corrupt cache entry {:?}: {}", entry_path, e);
                return None;
            }
        };

        if self.is_expired(&entry, Utc::now()) {
            debug!("Cache entry {} expired, removing", hash);
            let _ = fs::remove_file(&entry_path);
            return None;
        }

        Some(entry.result)
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        self.ttl_days > 0
            && now - entry.analyzed_at > Duration::days(i64::from(self.ttl_days))
    }

    /// Store the result for the file at `path`
    pub fn set(&self, path: &Path, info: &ReceiptInfo) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let hash = hash_file(path)?;
        self.store(&hash, info)
    }

    /// Store by precomputed content hash, overwriting any existing entry
    pub fn store(&self, hash: &str, info: &ReceiptInfo) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let entry = CacheEntry {
            hash: hash.to_string(),
            analyzed_at: Utc::now(),
            result: info.clone(),
        };
        let data = serde_json::to_string_pretty(&entry)?;

        // Write then rename so concurrent writers of the same hash never leave a torn file
        let tmp_path = self.dir.join(format!("{}.{}.tmp", hash, Uuid::new_v4()));
        fs::write(&tmp_path, data)?;
        if let Err(e) = fs::rename(&tmp_path, self.entry_path(hash)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        Ok(())
    }

    /// Remove every entry, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            fs::remove_file(&path)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Number of persisted entries
    pub fn count(&self) -> Result<usize> {
        Ok(self.entry_files()?.len())
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
            })
            .collect())
    }
}

/// SHA-256 of the file's bytes, lowercase hex
pub fn hash_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn receipt() -> ReceiptInfo {
        ReceiptInfo {
            date: "20250115".to_string(),
            service: "Cursor".to_string(),
        }
    }

    fn cache_in(dir: &TempDir, ttl_days: u32) -> ContentCache {
        ContentCache::with_dir(dir.path().join("cache"), true, ttl_days).unwrap()
    }

    fn backdate(cache: &ContentCache, hash: &str, age: Duration) {
        let path = cache.entry_path(hash);
        let mut entry: CacheEntry =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        entry.analyzed_at = Utc::now() - age;
        fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_identical_content_shares_entry() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        let first = dir.path().join("first.pdf");
        let sub = dir.path().join("elsewhere");
        fs::create_dir(&sub).unwrap();
        let second = sub.join("renamed.pdf");
        fs::write(&first, b"same bytes").unwrap();
        fs::write(&second, b"same bytes").unwrap();

        cache.set(&first, &receipt()).unwrap();

        assert_eq!(cache.get(&second), Some(receipt()));
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn test_changed_content_misses() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        let path = dir.path().join("r.pdf");
        fs::write(&path, b"original").unwrap();
        cache.set(&path, &receipt()).unwrap();

        fs::write(&path, b"edited").unwrap();
        assert_eq!(cache.get(&path), None);
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 1);
        let path = dir.path().join("r.pdf");
        fs::write(&path, b"receipt").unwrap();
        cache.set(&path, &receipt()).unwrap();

        let hash = hash_file(&path).unwrap();
        backdate(&cache, &hash, Duration::days(2));

        assert_eq!(cache.get(&path), None);
        assert!(!cache.entry_path(&hash).exists());
        assert_eq!(cache.count().unwrap(), 0);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        let path = dir.path().join("r.pdf");
        fs::write(&path, b"receipt").unwrap();
        cache.set(&path, &receipt()).unwrap();

        let hash = hash_file(&path).unwrap();
        backdate(&cache, &hash, Duration::days(365));

        assert_eq!(cache.get(&path), Some(receipt()));
    }

    #[test]
    fn test_fresh_entry_within_ttl() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 30);
        let path = dir.path().join("r.pdf");
        fs::write(&path, b"receipt").unwrap();
        cache.set(&path, &receipt()).unwrap();
        assert_eq!(cache.get(&path), Some(receipt()));
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        let path = dir.path().join("r.pdf");
        fs::write(&path, b"receipt").unwrap();
        let hash = hash_file(&path).unwrap();
        fs::write(cache.entry_path(&hash), "{ truncated").unwrap();

        assert_eq!(cache.get(&path), None);
    }

    #[test]
    fn test_missing_file_is_miss() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        assert_eq!(cache.get(&dir.path().join("gone.pdf")), None);
    }

    #[test]
    fn test_entry_file_layout() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        cache.store("abc123", &receipt()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(cache.entry_path("abc123")).unwrap())
                .unwrap();
        assert_eq!(raw["hash"], "abc123");
        assert_eq!(raw["result"]["date"], "20250115");
        assert_eq!(raw["result"]["service"], "Cursor");
        assert!(DateTime::parse_from_rfc3339(raw["analyzed_at"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_clear_and_count() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        cache.store("one", &receipt()).unwrap();
        cache.store("two", &receipt()).unwrap();
        fs::write(cache.dir().join("notes.txt"), "keep").unwrap();

        assert_eq!(cache.count().unwrap(), 2);
        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.count().unwrap(), 0);
        assert!(cache.dir().join("notes.txt").exists());
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::with_dir(dir.path().join("off"), false, 0).unwrap();
        let path = dir.path().join("r.pdf");
        fs::write(&path, b"receipt").unwrap();

        cache.set(&path, &receipt()).unwrap();
        assert_eq!(cache.get(&path), None);
        assert_eq!(cache.count().unwrap(), 0);
        assert!(!cache.dir().exists());
    }
}
