//! LRU cache of built relationship graphs.
//!
//! Graph construction is deterministic and pure, so a graph can be reused
//! for every query against the same store. Keys include the store's
//! fingerprint: an invalidated store can never serve a stale graph.

use crate::graph::RelationGraph;
use crate::store::EntityStore;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

pub struct GraphCache {
    cache: Mutex<LruCache<(String, String), Arc<RelationGraph>>>,
}

impl GraphCache {
    /// Create a graph cache bounded to `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("Cache capacity must be at least 1");
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Fetch the graph for (source, fingerprint), building it on miss.
    pub fn get_or_build(
        &self,
        source_id: &str,
        fingerprint: &str,
        store: &EntityStore,
    ) -> Arc<RelationGraph> {
        let key = (source_id.to_string(), fingerprint.to_string());
        let mut cache = self.cache.lock().unwrap();
        if let Some(graph) = cache.get(&key) {
            return Arc::clone(graph);
        }
        let graph = Arc::new(RelationGraph::build(store));
        cache.put(key, Arc::clone(&graph));
        graph
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }
}
