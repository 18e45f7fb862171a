//! Caching layers: document cache (source -> entity store lifecycle) and
//! graph cache (store -> relationship graph reuse).

mod document_cache;
mod graph_cache;

pub use document_cache::{CacheConfig, DocumentCache};
pub use graph_cache::GraphCache;
