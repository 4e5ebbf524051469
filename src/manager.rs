//! Owner of the catalog, the dataset caches and the published directory.

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::annotator::{AnnotatorDirectory, CompositeAnnotator, Layers};
use crate::api::Annotator;
use crate::asn::{AsNameTable, AsnDataset, AsnFamily};
use crate::cache::{CachingLoader, LoaderConfig};
use crate::catalog::{DatasetCatalog, DatasetKind};
use crate::config::{ASN_CACHE_CAPACITY, GEO_CACHE_CAPACITY, MAX_CONCURRENT_LOADS};
use crate::error::{Error, Result};
use crate::geolite2::GeoDataset;
use crate::metrics::{Metrics, METRICS};
use crate::ranges::BuildOptions;
use crate::store::ObjectStore;

/// Cache sizes of the three dataset families.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub geo_capacity: usize,
    pub asn_capacity: usize,
    pub max_concurrent_loads: usize,
    pub build: BuildOptions,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            geo_capacity: GEO_CACHE_CAPACITY,
            asn_capacity: ASN_CACHE_CAPACITY,
            max_concurrent_loads: MAX_CONCURRENT_LOADS,
            build: BuildOptions::default(),
        }
    }
}

struct Published {
    generation: u64,
    directory: Arc<AnnotatorDirectory>,
}

/// Resolves request dates to composite annotators, loading datasets on
/// demand.
///
/// # Example
///
/// ```ignore
/// use geoannotate::{as_names, AnnotatorManager, LocalStore};
/// use std::sync::Arc;
///
/// let store = Arc::new(LocalStore::new("/data/downloader-example"));
/// let manager = AnnotatorManager::new(store, as_names(), tokio::runtime::Handle::current());
/// manager.update()?;
/// manager.load_latest();
///
/// // Error::Loading until the datasets for the date are in memory.
/// let annotator = manager.get_annotator(chrono::Utc::now())?;
/// ```
pub struct AnnotatorManager {
    store: Arc<dyn ObjectStore>,
    catalog: ArcSwap<DatasetCatalog>,
    geo: CachingLoader<GeoDataset>,
    asn_v4: CachingLoader<AsnDataset>,
    asn_v6: CachingLoader<AsnDataset>,
    generation: Arc<AtomicU64>,
    directory: ArcSwapOption<Published>,
    rebuild: Mutex<()>,
}

impl AnnotatorManager {
    pub fn new(store: Arc<dyn ObjectStore>, as_names: Arc<AsNameTable>, runtime: Handle) -> Self {
        Self::with_config(store, as_names, runtime, ManagerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ObjectStore>,
        as_names: Arc<AsNameTable>,
        runtime: Handle,
        config: ManagerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_loads));
        let generation = Arc::new(AtomicU64::new(0));

        let geo = {
            let store = store.clone();
            let build = config.build.clone();
            CachingLoader::new(
                LoaderConfig {
                    family: "Geo".to_string(),
                    kind: DatasetKind::GeoLite2,
                    capacity: config.geo_capacity,
                },
                Arc::new(move |name: &str| GeoDataset::from_zip(name, store.get(name)?, &build)),
                permits.clone(),
                generation.clone(),
                runtime.clone(),
            )
        };
        let asn_loader = |family: AsnFamily, kind: DatasetKind| {
            let store = store.clone();
            let as_names = as_names.clone();
            let build = config.build.clone();
            CachingLoader::new(
                LoaderConfig {
                    family: family.to_string(),
                    kind,
                    capacity: config.asn_capacity,
                },
                Arc::new(move |name: &str| {
                    AsnDataset::from_bytes(name, family, store.get(name)?, as_names.clone(), &build)
                }),
                permits.clone(),
                generation.clone(),
                runtime.clone(),
            )
        };
        let asn_v4 = asn_loader(AsnFamily::V4, DatasetKind::RouteViewsV4);
        let asn_v6 = asn_loader(AsnFamily::V6, DatasetKind::RouteViewsV6);

        Self {
            store,
            catalog: ArcSwap::from_pointee(DatasetCatalog::default()),
            geo,
            asn_v4,
            asn_v6,
            generation,
            directory: ArcSwapOption::empty(),
            rebuild: Mutex::new(()),
        }
    }

    /// Rescan the object store and register new datasets. Blocks on store
    /// I/O.
    pub fn update(&self) -> Result<()> {
        Metrics::inc(&METRICS.rescans);
        let catalog = match DatasetCatalog::scan(self.store.as_ref()) {
            Ok(catalog) => catalog,
            Err(e) => {
                Metrics::inc(&METRICS.rescan_failures);
                return Err(e);
            }
        };
        self.geo.update_cache(&catalog);
        self.asn_v4.update_cache(&catalog);
        self.asn_v6.update_cache(&catalog);
        self.catalog.store(Arc::new(catalog));
        Ok(())
    }

    /// Start loading the newest dataset of every family.
    pub fn load_latest(&self) {
        let catalog = self.catalog.load();
        start_latest(&self.geo, &catalog);
        start_latest(&self.asn_v4, &catalog);
        start_latest(&self.asn_v6, &catalog);
    }

    /// Clear sticky load failures in every family.
    pub fn retry_failed(&self) -> usize {
        self.geo.retry_failed() + self.asn_v4.retry_failed() + self.asn_v6.retry_failed()
    }

    pub fn catalog(&self) -> Arc<DatasetCatalog> {
        self.catalog.load_full()
    }

    /// The annotator for requests dated `date`.
    ///
    /// Fails with [`Error::Loading`] while any dataset that should serve
    /// `date` is still loading or has failed to load; the load is started by
    /// the first such call.
    pub fn get_annotator(&self, date: DateTime<Utc>) -> Result<Arc<CompositeAnnotator>> {
        let catalog = self.catalog.load();
        let wanted = [
            resolve(&self.geo, &catalog, date),
            resolve(&self.asn_v4, &catalog, date),
            resolve(&self.asn_v6, &catalog, date),
        ];
        let mut loading = false;
        for result in wanted {
            match result {
                Ok(()) => {}
                Err(Error::Loading) => loading = true,
                // Sticky until the entry is unloaded by `retry_failed` or
                // eviction; never answered from another date.
                Err(e @ Error::LoadFailed { .. }) => {
                    log::debug!("Dataset for {} unavailable: {}", date, e);
                    loading = true;
                }
                Err(e) => return Err(e),
            }
        }
        if loading {
            return Err(Error::Loading);
        }
        Ok(self.directory()?.get_annotator(date))
    }

    /// The current directory, rebuilt first if datasets changed.
    pub fn directory(&self) -> Result<Arc<AnnotatorDirectory>> {
        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(published) = &*self.directory.load() {
            if published.generation == generation {
                return Ok(published.directory.clone());
            }
        }

        let _guard = self.rebuild.lock();
        let generation = self.generation.load(Ordering::SeqCst);
        let previous = self.directory.load_full();
        if let Some(published) = previous.as_ref() {
            if published.generation == generation {
                return Ok(published.directory.clone());
            }
        }

        let layers = Layers {
            geo: layer(self.geo.fetch_all()),
            asn_v4: layer(self.asn_v4.fetch_all()),
            asn_v6: layer(self.asn_v6.fetch_all()),
        };
        match AnnotatorDirectory::build(layers) {
            Ok(directory) => {
                let directory = Arc::new(directory);
                log::info!(
                    "Rebuilt annotator directory: {} composites (generation {})",
                    directory.len(),
                    generation
                );
                Metrics::inc(&METRICS.directory_builds);
                self.directory.store(Some(Arc::new(Published {
                    generation,
                    directory: directory.clone(),
                })));
                Ok(directory)
            }
            Err(e) => match previous {
                Some(published) => {
                    log::warn!("Keeping previous annotator directory: {}", e);
                    Ok(published.directory.clone())
                }
                None => Err(e),
            },
        }
    }
}

fn resolve<T: Send + Sync + 'static>(
    loader: &CachingLoader<T>,
    catalog: &DatasetCatalog,
    date: DateTime<Utc>,
) -> Result<()> {
    let file = catalog
        .last_before(loader.kind(), date)
        .ok_or(Error::NoAnnotator)?;
    loader.get(&file.name).map(|_| ())
}

fn start_latest<T: Send + Sync + 'static>(loader: &CachingLoader<T>, catalog: &DatasetCatalog) {
    let Some(file) = catalog.latest_of(loader.kind()) else {
        log::warn!("{}: no datasets in catalog", loader.family());
        return;
    };
    match loader.get(&file.name) {
        Ok(_) | Err(Error::Loading) => {}
        Err(e) => log::warn!("{}: latest dataset {} unavailable: {}", loader.family(), file.name, e),
    }
}

fn layer<T: Annotator + 'static>(datasets: Vec<Arc<T>>) -> Vec<Arc<dyn Annotator>> {
    datasets
        .into_iter()
        .map(|dataset| dataset as Arc<dyn Annotator>)
        .collect()
}
