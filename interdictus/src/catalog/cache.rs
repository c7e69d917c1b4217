//! Memoizing catalog wrapper.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{CatalogError, DatasetFingerprint, LayerCatalog, LayerLoadError, RestrictionLayer};

/// Caches loaded layers of an inner catalog.
///
/// Layers are keyed by id and shared as `Arc`s. Whenever the inner
/// catalog's fingerprint changes (the dataset was replaced) every cached
/// layer is dropped before the next list or load is answered.
pub struct CachedCatalog<C> {
    inner: C,
    layers: DashMap<String, Arc<RestrictionLayer>>,
    seen: Mutex<Option<DatasetFingerprint>>,
}

impl<C: LayerCatalog> CachedCatalog<C> {
    pub fn new(inner: C) -> Self {
        let seen = inner.fingerprint();
        Self {
            inner,
            layers: DashMap::new(),
            seen: Mutex::new(seen),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Number of layers currently cached.
    pub fn cached(&self) -> usize {
        self.layers.len()
    }

    /// Drop every cached layer.
    pub fn clear(&self) {
        self.layers.clear();
    }

    /// Clear the cache if the dataset fingerprint changed since last seen.
    ///
    /// Returns true when the cache was invalidated.
    pub fn refresh(&self) -> bool {
        let current = self.inner.fingerprint();
        let mut seen = self.seen.lock();
        if *seen == current {
            return false;
        }
        tracing::info!(
            catalog = %self.inner.describe(),
            evicted = self.layers.len(),
            "Dataset changed, clearing layer cache"
        );
        *seen = current;
        self.layers.clear();
        true
    }
}

impl<C: LayerCatalog> LayerCatalog for CachedCatalog<C> {
    fn list_layers(&self) -> Result<Vec<String>, CatalogError> {
        self.refresh();
        self.inner.list_layers()
    }

    fn load_layer(&self, id: &str) -> Result<Arc<RestrictionLayer>, LayerLoadError> {
        self.refresh();
        if let Some(layer) = self.layers.get(id) {
            return Ok(Arc::clone(layer.value()));
        }

        let loaded = self.inner.load_layer(id)?;
        let entry = self.layers.entry(id.to_string()).or_insert(loaded);
        Ok(Arc::clone(entry.value()))
    }

    fn fingerprint(&self) -> Option<DatasetFingerprint> {
        self.inner.fingerprint()
    }

    fn describe(&self) -> String {
        format!("cached {}", self.inner.describe())
    }
}
