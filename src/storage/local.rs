//! Local filesystem storage backend.

use crate::error::{GedmcpError, Result};
use crate::storage::{FetchedSource, SourceStorage};
use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Resolves source identifiers as paths relative to a root directory.
/// Fingerprint is the SHA-256 of the file content.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve a source id to a path under the root. Rejects identifiers
    /// that would escape the root directory.
    fn resolve(&self, source_id: &str) -> Result<PathBuf> {
        let relative = Path::new(source_id);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(GedmcpError::InvalidInput(format!(
                "Source identifier must be a relative path: {}",
                source_id
            )));
        }
        Ok(self.root.join(relative))
    }
}

pub fn content_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl SourceStorage for LocalStorage {
    fn fetch<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<FetchedSource>> {
        Box::pin(async move {
            let path = self.resolve(source_id)?;
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GedmcpError::SourceNotFound(source_id.to_string())
                } else {
                    GedmcpError::Io(e)
                }
            })?;
            let fingerprint = content_fingerprint(&bytes);
            Ok(FetchedSource { bytes, fingerprint })
        })
    }

    fn fingerprint<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(self.fetch(source_id).await?.fingerprint) })
    }
}
