//! Source retrieval backends.
//!
//! A storage backend resolves a source identifier to raw bytes plus an
//! opaque content fingerprint. Fingerprints are compared only for equality;
//! the document cache uses them to detect source-version changes.

pub mod http;
pub mod local;

pub use http::HttpStorage;
pub use local::LocalStorage;

use crate::error::Result;
use futures_util::future::BoxFuture;

/// Raw source bytes plus content fingerprint.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub bytes: Vec<u8>,
    pub fingerprint: String,
}

/// Trait for source storage backends.
pub trait SourceStorage: Send + Sync {
    /// Retrieve the source content and its fingerprint.
    fn fetch<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<FetchedSource>>;

    /// Retrieve only the current fingerprint, for cheap staleness checks.
    fn fingerprint<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<String>>;
}
