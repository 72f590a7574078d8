//! Filesystem blob store for document bytes and rendered certificates.
//!
//! Blob paths are forward-slash relative paths under a configured root:
//! `documents/{document_id}/{filename}`, `archive/{year}/{document_id}/
//! {filename}` and `certificates/{request_id}/certificate.pdf`. The store
//! creates parent directories on write and never follows absolute or
//! parent-relative paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{EsignError, EsignResult};

/// Filesystem-backed blob store.
///
/// Cheap to clone; all state is the root path.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open a blob store, creating the root directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> EsignResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::info!(root = %root.display(), "Opened blob store");
        Ok(Self { root })
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a blob path under the root, rejecting traversal.
    fn resolve(&self, blob_path: &str) -> EsignResult<PathBuf> {
        let relative = Path::new(blob_path);
        let safe = relative.components().all(|c| matches!(c, Component::Normal(_)));
        if blob_path.is_empty() || !safe {
            return Err(EsignError::Blob(format!("invalid blob path: {blob_path}")));
        }
        Ok(self.root.join(relative))
    }

    /// Write a blob, creating parent directories.
    pub fn put(&self, blob_path: &str, bytes: &[u8]) -> EsignResult<()> {
        let path = self.resolve(blob_path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        tracing::debug!(blob_path, size = bytes.len(), "Wrote blob");
        Ok(())
    }

    /// Read a blob's bytes.
    pub fn get(&self, blob_path: &str) -> EsignResult<Vec<u8>> {
        let path = self.resolve(blob_path)?;
        std::fs::read(&path)
            .map_err(|e| EsignError::Blob(format!("failed to read {blob_path}: {e}")))
    }

    /// Check whether a blob exists.
    pub fn exists(&self, blob_path: &str) -> bool {
        self.resolve(blob_path).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Copy a blob to a new path, creating parent directories.
    pub fn copy(&self, from: &str, to: &str) -> EsignResult<u64> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let copied = std::fs::copy(&source, &target)
            .map_err(|e| EsignError::Blob(format!("failed to copy {from} to {to}: {e}")))?;
        tracing::debug!(from, to, bytes = copied, "Copied blob");
        Ok(copied)
    }
}
