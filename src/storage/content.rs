// src/storage/content.rs

//! Content-addressed file storage.
//!
//! Files are keyed by the hex sha256 of their bytes, so identical
//! content always collapses to a single entry and a `put` of known
//! bytes is a no-op. Entries are immutable: they are created once and
//! only ever removed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Content-addressed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (and create if needed) a store at the given root.
    ///
    /// Failing to create the root is fatal to the caller's run.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| AppError::store(format!("cannot create content dir {:?}: {}", root, e)))?;
        Ok(Self { root })
    }

    /// Hex sha256 digest of the given bytes.
    pub fn hash(content: &[u8]) -> String {
        hex::encode(Sha256::digest(content))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Store content and return its key.
    ///
    /// If a file for the hash already exists the existing key is
    /// returned without rewriting. New files are written to a unique
    /// temp name and renamed into place, so concurrent puts of the
    /// same bytes cannot observe partial writes.
    pub async fn put(&self, content: &[u8]) -> Result<String> {
        let key = Self::hash(content);
        let path = self.path_for(&key);
        if tokio::fs::try_exists(&path).await? {
            return Ok(key);
        }

        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .root
            .join(format!(".{}.{}.{}.tmp", key, std::process::id(), counter));
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(key)
    }

    /// Read content by key.
    ///
    /// Returns `None` for an empty key or a missing file; "not found"
    /// is never an error.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Ok(None);
        }
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Best-effort removal; returns whether the entry is gone.
    pub async fn remove(&self, key: &str) -> bool {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to remove content entry '{}': {}", key, e);
                false
            }
        }
    }
}
