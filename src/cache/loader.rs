//! Per-family cache of lazily loaded datasets.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use super::entry::{CacheEntry, EntryStatus};
use crate::catalog::{DatasetCatalog, DatasetKind};
use crate::error::{Error, Result};
use crate::metrics::METRICS;

/// Builds a dataset from its object name. Runs on the blocking pool.
pub type LoadFn<T> = Arc<dyn Fn(&str) -> Result<T> + Send + Sync>;

/// Configuration for a [`CachingLoader`].
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Label used in logs and metrics.
    pub family: String,
    /// Catalog kind whose files this loader serves.
    pub kind: DatasetKind,
    /// Datasets kept in memory, loads in flight included.
    pub capacity: usize,
}

/// Lazily loads and caches the datasets of one family.
///
/// [`get`](CachingLoader::get) never waits: a miss reserves the entry,
/// starts a background load and reports [`Error::Loading`]. Completed
/// loads and evictions bump the shared generation counter so the annotator
/// directory knows to rebuild.
pub struct CachingLoader<T> {
    config: LoaderConfig,
    entries: RwLock<BTreeMap<String, Arc<CacheEntry<T>>>>,
    load: LoadFn<T>,
    permits: Arc<Semaphore>,
    generation: Arc<AtomicU64>,
    runtime: Handle,
}

impl<T: Send + Sync + 'static> CachingLoader<T> {
    pub fn new(
        config: LoaderConfig,
        load: LoadFn<T>,
        permits: Arc<Semaphore>,
        generation: Arc<AtomicU64>,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            entries: RwLock::new(BTreeMap::new()),
            load,
            permits,
            generation,
            runtime,
        }
    }

    pub fn family(&self) -> &str {
        &self.config.family
    }

    pub fn kind(&self) -> DatasetKind {
        self.config.kind
    }

    /// Add EMPTY entries for catalog files not seen before. Never evicts.
    ///
    /// Returns the number of new entries.
    pub fn update_cache(&self, catalog: &DatasetCatalog) -> usize {
        let mut entries = self.entries.write();
        let mut added = 0;
        for file in catalog.files(self.config.kind) {
            if !entries.contains_key(&file.name) {
                entries.insert(file.name.clone(), Arc::new(CacheEntry::new()));
                added += 1;
            }
        }
        if added > 0 {
            log::info!("{}: {} new datasets, {} known", self.config.family, added, entries.len());
        }
        added
    }

    /// READY datasets in publication order.
    pub fn fetch_all(&self) -> Vec<Arc<T>> {
        self.snapshot()
            .into_iter()
            .filter_map(|(_, entry)| entry.peek())
            .collect()
    }

    /// The dataset named `name`, or [`Error::Loading`] after starting a
    /// background load.
    pub fn get(&self, name: &str) -> Result<Arc<T>> {
        let entry = self
            .entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDataset(name.to_string()))?;

        match entry.get() {
            EntryStatus::Ready(dataset) => Ok(dataset),
            EntryStatus::Loading => Err(Error::Loading),
            EntryStatus::Failed(reason) => Err(Error::LoadFailed {
                name: name.to_string(),
                reason,
            }),
            EntryStatus::Unloaded => {
                if self.reserve(name, &entry) {
                    self.spawn_load(name.to_string(), entry);
                }
                Err(Error::Loading)
            }
        }
    }

    /// Clear sticky failures so the next `get` retries the load.
    pub fn retry_failed(&self) -> usize {
        let cleared = self
            .snapshot()
            .into_iter()
            .filter(|(_, entry)| entry.is_failed() && entry.unload())
            .count();
        if cleared > 0 {
            log::info!("{}: cleared {} failed datasets", self.config.family, cleared);
        }
        cleared
    }

    /// Number of READY or LOADING entries.
    pub fn resident(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|(_, entry)| entry.is_resident())
            .count()
    }

    /// Number of known datasets.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn snapshot(&self) -> Vec<(String, Arc<CacheEntry<T>>)> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    /// Reserve `entry` for loading, evicting the least recently used READY
    /// dataset when the family is at capacity.
    ///
    /// The entries lock is held throughout, so concurrent misses cannot
    /// push the resident count past capacity. Returns `false` when another
    /// caller owns the load or when every resident dataset is still
    /// loading.
    fn reserve(&self, name: &str, entry: &CacheEntry<T>) -> bool {
        let entries = self.entries.write();
        if entry.is_resident() || entry.is_failed() {
            return false;
        }
        let resident = entries.values().filter(|other| other.is_resident()).count();
        if resident >= self.config.capacity {
            let victim = entries
                .iter()
                .filter(|(other, candidate)| other.as_str() != name && candidate.is_ready())
                .min_by_key(|(_, candidate)| candidate.last_used());
            let Some((victim, victim_entry)) = victim else {
                log::debug!(
                    "{}: {} waits, {} datasets loading",
                    self.config.family,
                    name,
                    resident
                );
                return false;
            };
            if !victim_entry.unload() {
                return false;
            }
            log::info!("{}: evicted {}", self.config.family, victim);
            METRICS.dataset_evicted(&self.config.family);
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        entry.reserve()
    }

    fn spawn_load(&self, name: String, entry: Arc<CacheEntry<T>>) {
        let load = self.load.clone();
        let permits = self.permits.clone();
        let generation = self.generation.clone();
        let family = self.config.family.clone();

        self.runtime.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(permit) => {
                    log::info!("{}: loading {}", family, name);
                    let target = name.clone();
                    let task = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        load(&target)
                    });
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(Error::LoadFailed {
                            name: name.clone(),
                            reason: e.to_string(),
                        }),
                    }
                }
                Err(_) => Err(Error::Config("load permits closed".to_string())),
            };

            let loaded = result.is_ok();
            if let Err(e) = &result {
                log::error!("{}: failed to load {}: {}", family, name, e);
                METRICS.dataset_failed(&family);
            }
            match entry.set(result) {
                Ok(()) if loaded => {
                    METRICS.dataset_loaded(&family);
                    generation.fetch_add(1, Ordering::SeqCst);
                }
                Ok(()) => {}
                Err(e) => log::error!("{}: could not publish {}: {}", family, name, e),
            }
        });
    }
}
