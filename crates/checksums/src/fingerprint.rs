//! Digest cache keyed by file identity.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::digest::content_digest;

#[derive(Clone, Debug, PartialEq, Eq)]
struct CacheEntry {
    mtime: SystemTime,
    len: u64,
    sha: String,
}

/// Caches [`content_digest`] results per path.
///
/// A cached digest is reused only while the file's modification time and
/// size are unchanged; a rewritten file is re-hashed on the next lookup.
/// The cache is scoped to one synchronization run.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

impl FingerprintCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical digest of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or stat'ed.
    pub fn digest_file(&mut self, path: &Path) -> io::Result<String> {
        let meta = fs::metadata(path)?;
        let mtime = meta.modified()?;
        let len = meta.len();

        if let Some(entry) = self.entries.get(path) {
            if entry.mtime == mtime && entry.len == len {
                return Ok(entry.sha.clone());
            }
        }

        let sha = content_digest(&fs::read(path)?);
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                mtime,
                len,
                sha: sha.clone(),
            },
        );
        Ok(sha)
    }

    /// Drops the cached digest for `path`, if any.
    pub fn forget(&mut self, path: &Path) {
        self.entries.remove(path);
    }
}
