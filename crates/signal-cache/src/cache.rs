use crate::error::CacheError;
use crate::key::CacheKey;
use core_types::SignalResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

/// One cache entry. The cell is empty while its computation is in flight.
struct Slot {
    cell: Arc<OnceCell<SignalResult>>,
    stamp: u64,
}

impl Slot {
    /// Completed entries, and empty cells nobody is waiting on, may be evicted.
    fn evictable(&self) -> bool {
        self.cell.initialized() || Arc::strong_count(&self.cell) == 1
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Slot>,
    /// Recency stamp -> key, oldest first.
    recency: BTreeMap<u64, CacheKey>,
    clock: u64,
}

impl CacheState {
    /// Returns the slot's cell, creating the slot if needed, and marks it most recent.
    fn touch(&mut self, key: &CacheKey) -> Result<Arc<OnceCell<SignalResult>>, CacheError> {
        self.clock += 1;
        let stamp = self.clock;
        match self.entries.get_mut(key) {
            Some(slot) => {
                if self.recency.remove(&slot.stamp).as_ref() != Some(key) {
                    return Err(CacheError::Corruption(format!(
                        "recency index lost track of {}",
                        key
                    )));
                }
                slot.stamp = stamp;
                self.recency.insert(stamp, key.clone());
                Ok(Arc::clone(&slot.cell))
            }
            None => {
                let cell = Arc::new(OnceCell::new());
                self.entries.insert(
                    key.clone(),
                    Slot {
                        cell: Arc::clone(&cell),
                        stamp,
                    },
                );
                self.recency.insert(stamp, key.clone());
                Ok(cell)
            }
        }
    }

    fn insert_completed(&mut self, key: CacheKey, value: SignalResult) {
        self.clock += 1;
        let stamp = self.clock;
        if let Some(old) = self.entries.remove(&key) {
            self.recency.remove(&old.stamp);
        }
        self.recency.insert(stamp, key.clone());
        self.entries.insert(
            key,
            Slot {
                cell: Arc::new(OnceCell::new_with(Some(value))),
                stamp,
            },
        );
    }

    /// Evicts least-recently-used evictable entries until within capacity.
    ///
    /// If every remaining entry is in flight the cache stays over capacity until
    /// those computations finish.
    fn evict(&mut self, capacity: usize) -> Result<u64, CacheError> {
        let mut evicted = 0;
        while self.entries.len() > capacity {
            let mut victim = None;
            for (stamp, key) in &self.recency {
                let slot = self.entries.get(key).ok_or_else(|| {
                    CacheError::Corruption(format!("recency index names missing entry {}", key))
                })?;
                if slot.evictable() {
                    victim = Some((*stamp, key.clone()));
                    break;
                }
            }
            let Some((stamp, key)) = victim else {
                break;
            };
            self.recency.remove(&stamp);
            self.entries.remove(&key);
            evicted += 1;
        }
        if self.entries.len() != self.recency.len() {
            return Err(CacheError::Corruption(format!(
                "{} entries but {} recency stamps",
                self.entries.len(),
                self.recency.len()
            )));
        }
        Ok(evicted)
    }

    /// Drops a slot whose computation failed, unless someone else is still waiting on it.
    fn discard_failed(&mut self, key: &CacheKey) {
        let orphaned = self
            .entries
            .get(key)
            .is_some_and(|slot| !slot.cell.initialized() && Arc::strong_count(&slot.cell) == 1);
        if orphaned {
            if let Some(slot) = self.entries.remove(key) {
                self.recency.remove(&slot.stamp);
            }
        }
    }
}

/// A point-in-time view of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Serialize, Deserialize)]
struct SpillEntry {
    key: CacheKey,
    value: SignalResult,
}

/// A bounded, single-flight memo of analyst results.
pub struct SignalCache {
    capacity: usize,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for SignalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SignalCache {
    /// Creates an empty cache holding at most `capacity` completed entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, CacheError> {
        self.state
            .lock()
            .map_err(|_| CacheError::Corruption("cache lock poisoned".to_string()))
    }

    /// Returns the cached signal for `key`, or runs `compute` to produce it.
    ///
    /// At most one computation per key runs at a time; concurrent callers wait for it
    /// and share its result. A failed computation is not cached, so a later caller
    /// (including one already waiting) computes again. If the computing caller is
    /// cancelled, a waiting caller takes over; the entry is never left stuck in flight.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &CacheKey, compute: F) -> Result<SignalResult, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SignalResult, E>>,
        E: From<CacheError>,
    {
        let cell = self.lock()?.touch(key)?;

        if let Some(value) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Signal cache hit.");
            return Ok(value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "Signal cache miss.");

        let outcome = cell
            .get_or_try_init(|| {
                self.computations.fetch_add(1, Ordering::Relaxed);
                compute()
            })
            .await
            .map(SignalResult::clone);
        drop(cell);

        let mut state = self.lock()?;
        match outcome {
            Ok(value) => {
                let evicted = state.evict(self.capacity)?;
                if evicted > 0 {
                    self.evictions.fetch_add(evicted, Ordering::Relaxed);
                    tracing::debug!(evicted, "Signal cache evicted least recently used entries.");
                }
                Ok(value)
            }
            Err(e) => {
                state.discard_failed(key);
                Err(e)
            }
        }
    }

    /// Returns the completed value for `key` without computing or touching recency.
    pub fn peek(&self, key: &CacheKey) -> Result<Option<SignalResult>, CacheError> {
        Ok(self
            .lock()?
            .entries
            .get(key)
            .and_then(|slot| slot.cell.get().cloned()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Writes every completed entry to `path` as JSON, oldest first.
    ///
    /// The file is written beside its destination and renamed into place, so a crash
    /// never leaves a truncated spill file.
    pub fn spill(&self, path: &Path) -> Result<usize, CacheError> {
        let entries: Vec<SpillEntry> = {
            let state = self.lock()?;
            state
                .recency
                .values()
                .filter_map(|key| {
                    let value = state.entries.get(key)?.cell.get()?.clone();
                    Some(SpillEntry {
                        key: key.clone(),
                        value,
                    })
                })
                .collect()
        };

        let json = serde_json::to_vec_pretty(&entries)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), entries = entries.len(), "Signal cache spilled.");
        Ok(entries.len())
    }

    /// Builds a cache pre-populated from a spill file. A missing file yields an
    /// empty cache; an unreadable one is reported as corruption.
    pub fn load(path: &Path, capacity: usize) -> Result<Self, CacheError> {
        let cache = Self::new(capacity);
        if !path.exists() {
            return Ok(cache);
        }

        let bytes = std::fs::read(path)?;
        let entries: Vec<SpillEntry> = serde_json::from_slice(&bytes).map_err(|e| {
            CacheError::Corruption(format!("spill file {} is unreadable: {}", path.display(), e))
        })?;

        {
            let mut state = cache.lock()?;
            for entry in entries {
                state.insert_completed(entry.key, entry.value);
            }
            let evicted = state.evict(cache.capacity)?;
            cache.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
        tracing::info!(path = %path.display(), entries = cache.len(), "Signal cache loaded.");
        Ok(cache)
    }
}
