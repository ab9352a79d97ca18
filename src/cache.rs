//! Content-addressed cache for processed document records.
//!
//! Each entry is one JSON file named `<hex-digest>.json` under the cache
//! directory, holding a serialized [`DocumentRecord`]. The key is a digest
//! of the file's bytes, so byte-identical files in different directories
//! share one entry and a one-byte change produces a new key. Entries are
//! never mutated in place; there is no TTL and no schema version field, so
//! changing the record shape means invalidating the whole directory.
//!
//! Caching is an optimization, not a correctness requirement: a missing,
//! unreadable, or malformed entry is a miss, and a failed write is logged
//! and swallowed.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::DocumentRecord;

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Opens the cache, creating the directory tree if needed. Directory
    /// creation failure is fatal: without a cache directory the pipeline
    /// cannot run.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Streams the file through SHA-256 and returns the lowercase hex
    /// digest. This is a dedup key, not an integrity proof; the
    /// authentication pipeline computes its own hash set.
    pub fn content_hash(path: &Path) -> Result<String> {
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file
                .read(&mut buf)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{}.json", digest))
    }

    /// Looks up the entry for a content digest. Absent, unreadable, and
    /// malformed entries are all misses; malformed payloads additionally
    /// log a warning before the caller reprocesses the file.
    pub fn load(&self, digest: &str) -> Option<DocumentRecord> {
        let path = self.entry_path(digest);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(entry = %path.display(), error = %e, "failed to read cache entry");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(entry = %path.display(), error = %e, "malformed cache entry, reprocessing");
                None
            }
        }
    }

    /// Writes the record through to its entry file. Failures are logged
    /// and swallowed.
    pub fn save(&self, record: &DocumentRecord) {
        let path = self.entry_path(&record.content_hash);
        let json = match serde_json::to_string_pretty(record) {
            Ok(j) => j,
            Err(e) => {
                warn!(entry = %path.display(), error = %e, "failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = std::fs::write(&path, json) {
            warn!(entry = %path.display(), error = %e, "failed to write cache entry");
        }
    }
}
