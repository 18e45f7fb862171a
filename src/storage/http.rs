//! HTTP storage backend.
//!
//! Source identifiers are resolved against a base URL. The fingerprint is
//! the ETag header when the server provides one, otherwise a hash of the
//! body. Both are opaque to the cache.

use crate::error::{GedmcpError, Result};
use crate::storage::{local::content_fingerprint, FetchedSource, SourceStorage};
use futures_util::future::BoxFuture;
use url::Url;

pub struct HttpStorage {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpStorage {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GedmcpError::Config(format!("Invalid storage base URL {}: {}", base_url, e)))?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    fn source_url(&self, source_id: &str) -> Result<Url> {
        self.base_url.join(source_id).map_err(|e| {
            GedmcpError::InvalidInput(format!("Invalid source identifier {}: {}", source_id, e))
        })
    }
}

fn etag_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string())
}

impl SourceStorage for HttpStorage {
    fn fetch<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<FetchedSource>> {
        Box::pin(async move {
            let url = self.source_url(source_id)?;
            let response = self.client.get(url.clone()).send().await.map_err(|e| {
                GedmcpError::SourceLoadFailed {
                    source_id: source_id.to_string(),
                    reason: e.to_string(),
                }
            })?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(GedmcpError::SourceNotFound(source_id.to_string()));
            }
            if !response.status().is_success() {
                return Err(GedmcpError::SourceLoadFailed {
                    source_id: source_id.to_string(),
                    reason: format!("HTTP {}", response.status()),
                });
            }

            let etag = etag_of(&response);
            let bytes = response
                .bytes()
                .await
                .map_err(|e| GedmcpError::SourceLoadFailed {
                    source_id: source_id.to_string(),
                    reason: e.to_string(),
                })?
                .to_vec();
            let fingerprint = etag.unwrap_or_else(|| content_fingerprint(&bytes));
            Ok(FetchedSource { bytes, fingerprint })
        })
    }

    fn fingerprint<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let url = self.source_url(source_id)?;
            // HEAD first; servers without ETag support force a full fetch
            let response = self.client.head(url).send().await.map_err(|e| {
                GedmcpError::SourceLoadFailed {
                    source_id: source_id.to_string(),
                    reason: e.to_string(),
                }
            })?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(GedmcpError::SourceNotFound(source_id.to_string()));
            }
            if response.status().is_success() {
                if let Some(etag) = etag_of(&response) {
                    return Ok(etag);
                }
            }
            Ok(self.fetch(source_id).await?.fingerprint)
        })
    }
}
