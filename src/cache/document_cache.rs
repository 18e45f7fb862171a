//! Lifecycle owner for (source identifier -> entity store) bindings.
//!
//! Per-entry state machine: Absent -> Loading -> Ready -> (Evicted |
//! Invalidated). Loading is single-flight: all requesters for the same
//! source, the initiator included, subscribe to one in-flight load through
//! a watch channel. The load itself runs in a spawned task, so cancelling
//! any one requester never strands the others. Ready entries serve
//! unlimited readers via `Arc`, so eviction never destroys a store that an
//! in-flight query still borrows. Staleness is detected lazily by comparing
//! the storage backend's current fingerprint before serving a cached entry.

use crate::decode::Decoder;
use crate::error::{GedmcpError, Result};
use crate::storage::SourceStorage;
use crate::store::EntityStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entry age before a reload is forced.
    pub ttl: Duration,
    /// Total estimated weight across Ready entries before LRU eviction.
    pub max_weight_bytes: usize,
    /// Budget for one load (fetch + decode); expiry reverts the slot to
    /// Absent and fails all waiters.
    pub load_timeout: Duration,
    /// Interval of the background TTL/capacity sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_weight_bytes: 64 * 1024 * 1024,
            load_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// A loaded store with its cache bookkeeping.
struct ReadyEntry {
    store: Arc<EntityStore>,
    fingerprint: String,
    created: Instant,
    last_access: Instant,
    weight: usize,
    /// Correlates load/evict log lines for one entry incarnation.
    entry_id: Uuid,
}

/// Cloneable load failure handed to every waiter of one load.
#[derive(Clone)]
enum LoadError {
    Timeout,
    NotFound,
    Failed(String),
}

impl LoadError {
    fn into_error(self, source_id: &str) -> GedmcpError {
        match self {
            LoadError::Timeout => GedmcpError::CacheLoadTimeout(source_id.to_string()),
            LoadError::NotFound => GedmcpError::SourceNotFound(source_id.to_string()),
            LoadError::Failed(reason) => GedmcpError::SourceLoadFailed {
                source_id: source_id.to_string(),
                reason,
            },
        }
    }
}

type LoadResult = std::result::Result<(Arc<EntityStore>, String), LoadError>;

enum Slot {
    /// Load in flight; requesters subscribe to the channel instead of
    /// starting a second load.
    Loading {
        rx: watch::Receiver<Option<LoadResult>>,
        generation: u64,
    },
    Ready(ReadyEntry),
}

enum Action {
    UseReady {
        store: Arc<EntityStore>,
        fingerprint: String,
    },
    Wait(watch::Receiver<Option<LoadResult>>),
}

pub struct DocumentCache {
    slots: Mutex<HashMap<String, Slot>>,
    storage: Arc<dyn SourceStorage>,
    decoder: Arc<dyn Decoder>,
    config: CacheConfig,
    generation: AtomicU64,
}

impl DocumentCache {
    pub fn new(
        storage: Arc<dyn SourceStorage>,
        decoder: Arc<dyn Decoder>,
        config: CacheConfig,
    ) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            storage,
            decoder,
            config,
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve a source to its entity store, loading on miss. The returned
    /// `Arc` keeps the store alive past any concurrent eviction.
    pub async fn get(self: &Arc<Self>, source_id: &str) -> Result<Arc<EntityStore>> {
        Ok(self.get_with_fingerprint(source_id).await?.0)
    }

    /// Like [`DocumentCache::get`], also returning the fingerprint the store
    /// was loaded under (the graph cache keys on it).
    pub async fn get_with_fingerprint(
        self: &Arc<Self>,
        source_id: &str,
    ) -> Result<(Arc<EntityStore>, String)> {
        loop {
            match self.next_action(source_id) {
                Action::UseReady { store, fingerprint } => {
                    // Lazy staleness check: never serve an entry whose
                    // source has moved on.
                    let current = self.storage.fingerprint(source_id).await?;
                    if current == fingerprint {
                        return Ok((store, fingerprint));
                    }
                    log::info!(
                        "Source {} changed fingerprint, invalidating cached entry",
                        source_id
                    );
                    self.remove_if_fingerprint(source_id, &fingerprint);
                }
                Action::Wait(mut rx) => {
                    let result = {
                        if rx.borrow().is_none() {
                            let _ = rx.changed().await;
                        }
                        rx.borrow().clone()
                    };
                    return match result {
                        Some(Ok(loaded)) => Ok(loaded),
                        Some(Err(err)) => Err(err.into_error(source_id)),
                        None => Err(GedmcpError::SourceLoadFailed {
                            source_id: source_id.to_string(),
                            reason: "load aborted".to_string(),
                        }),
                    };
                }
            }
        }
    }

    /// Decide what to do for one access attempt. Holds the lock only for
    /// the decision; loads and waits happen outside it.
    fn next_action(self: &Arc<Self>, source_id: &str) -> Action {
        let mut slots = self.slots.lock().unwrap();

        if let Some(Slot::Loading { rx, .. }) = slots.get(source_id) {
            return Action::Wait(rx.clone());
        }

        if let Some(Slot::Ready(entry)) = slots.get_mut(source_id) {
            if entry.created.elapsed() <= self.config.ttl {
                entry.last_access = Instant::now();
                return Action::UseReady {
                    store: Arc::clone(&entry.store),
                    fingerprint: entry.fingerprint.clone(),
                };
            }
            log::debug!(
                "Cache entry {} for {} exceeded TTL, reloading",
                entry.entry_id,
                source_id
            );
        }

        // Absent, or expired and about to be replaced
        slots.remove(source_id);
        Action::Wait(self.begin_load(&mut slots, source_id))
    }

    /// Transition Absent -> Loading and spawn the load task. Called with the
    /// slot lock held; the atomicity of that transition is what makes the
    /// load single-flight.
    fn begin_load(
        self: &Arc<Self>,
        slots: &mut HashMap<String, Slot>,
        source_id: &str,
    ) -> watch::Receiver<Option<LoadResult>> {
        let (tx, rx) = watch::channel(None);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        slots.insert(
            source_id.to_string(),
            Slot::Loading {
                rx: rx.clone(),
                generation,
            },
        );

        let cache = Arc::clone(self);
        let source_id = source_id.to_string();
        tokio::spawn(async move {
            cache.run_load(&source_id, tx, generation).await;
        });
        rx
    }

    async fn run_load(&self, source_id: &str, tx: watch::Sender<Option<LoadResult>>, generation: u64) {
        let outcome = tokio::time::timeout(self.config.load_timeout, self.load(source_id)).await;

        let result: LoadResult = match outcome {
            Ok(Ok((store, fingerprint))) => {
                self.install_ready(source_id, generation, &store, &fingerprint);
                Ok((store, fingerprint))
            }
            Ok(Err(err)) => {
                log::warn!("Load of source {} failed: {}", source_id, err);
                self.remove_loading(source_id, generation);
                Err(match err {
                    GedmcpError::SourceNotFound(_) => LoadError::NotFound,
                    other => LoadError::Failed(other.to_string()),
                })
            }
            Err(_elapsed) => {
                log::warn!(
                    "Load of source {} exceeded {:?}, reverting to absent",
                    source_id,
                    self.config.load_timeout
                );
                self.remove_loading(source_id, generation);
                Err(LoadError::Timeout)
            }
        };
        let _ = tx.send(Some(result));
    }

    async fn load(&self, source_id: &str) -> Result<(Arc<EntityStore>, String)> {
        let fetched = self.storage.fetch(source_id).await?;
        let doc = self.decoder.parse(&fetched.bytes).map_err(|e| match e {
            err @ GedmcpError::SourceNotFound(_) => err,
            other => GedmcpError::SourceLoadFailed {
                source_id: source_id.to_string(),
                reason: other.to_string(),
            },
        })?;
        let store = Arc::new(EntityStore::new(doc));
        Ok((store, fetched.fingerprint))
    }

    fn install_ready(
        &self,
        source_id: &str,
        generation: u64,
        store: &Arc<EntityStore>,
        fingerprint: &str,
    ) {
        let mut slots = self.slots.lock().unwrap();
        // An invalidate() during the load removed the slot; the result is
        // still handed to waiters but not cached.
        let ours = matches!(
            slots.get(source_id),
            Some(Slot::Loading { generation: g, .. }) if *g == generation
        );
        if !ours {
            return;
        }
        let entry_id = Uuid::new_v4();
        log::info!(
            "Loaded source {} ({} individuals, {} bytes, entry {})",
            source_id,
            store.individual_count(),
            store.weight(),
            entry_id
        );
        let now = Instant::now();
        slots.insert(
            source_id.to_string(),
            Slot::Ready(ReadyEntry {
                store: Arc::clone(store),
                fingerprint: fingerprint.to_string(),
                created: now,
                last_access: now,
                weight: store.weight(),
                entry_id,
            }),
        );
        Self::evict_over_capacity(&mut slots, self.config.max_weight_bytes);
    }

    fn remove_loading(&self, source_id: &str, generation: u64) {
        let mut slots = self.slots.lock().unwrap();
        if matches!(
            slots.get(source_id),
            Some(Slot::Loading { generation: g, .. }) if *g == generation
        ) {
            slots.remove(source_id);
        }
    }

    fn remove_if_fingerprint(&self, source_id: &str, fingerprint: &str) {
        let mut slots = self.slots.lock().unwrap();
        if matches!(
            slots.get(source_id),
            Some(Slot::Ready(entry)) if entry.fingerprint == fingerprint
        ) {
            slots.remove(source_id);
        }
    }

    /// Explicit cache-bust, independent of the fingerprint check.
    pub fn invalidate(&self, source_id: &str) {
        let mut slots = self.slots.lock().unwrap();
        if slots.remove(source_id).is_some() {
            log::info!("Invalidated cache entry for {}", source_id);
        }
    }

    /// TTL and capacity sweep. Readers holding an `Arc` are unaffected;
    /// removal here only drops the cache's own reference.
    pub fn sweep(&self) {
        let mut slots = self.slots.lock().unwrap();
        let ttl = self.config.ttl;
        slots.retain(|source_id, slot| match slot {
            Slot::Ready(entry) => {
                let keep = entry.created.elapsed() <= ttl;
                if !keep {
                    log::debug!("Sweep evicted expired entry {} ({})", entry.entry_id, source_id);
                }
                keep
            }
            Slot::Loading { .. } => true,
        });
        Self::evict_over_capacity(&mut slots, self.config.max_weight_bytes);
    }

    /// Evict least-recently-used Ready entries until total weight fits.
    fn evict_over_capacity(slots: &mut HashMap<String, Slot>, max_weight: usize) {
        loop {
            let total: usize = slots
                .values()
                .filter_map(|s| match s {
                    Slot::Ready(e) => Some(e.weight),
                    Slot::Loading { .. } => None,
                })
                .sum();
            if total <= max_weight {
                return;
            }
            let lru = slots
                .iter()
                .filter_map(|(id, slot)| match slot {
                    Slot::Ready(e) => Some((id.clone(), e.last_access)),
                    Slot::Loading { .. } => None,
                })
                .min_by_key(|(_, last_access)| *last_access)
                .map(|(id, _)| id);
            match lru {
                Some(id) => {
                    log::debug!("Capacity eviction of {}", id);
                    slots.remove(&id);
                }
                None => return,
            }
        }
    }

    /// Spawn the periodic background sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cache.config.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                cache.sweep();
            }
        })
    }

    /// Number of Ready entries (Loading slots excluded).
    pub fn ready_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn contains_ready(&self, source_id: &str) -> bool {
        matches!(
            self.slots.lock().unwrap().get(source_id),
            Some(Slot::Ready(_))
        )
    }
}
