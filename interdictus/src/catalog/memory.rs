//! In-memory catalog adapter.

use std::sync::Arc;

use geo::Geometry;

use super::{CatalogError, LayerCatalog, LayerFailure, LayerLoadError, RestrictionLayer};
use crate::geometry::Crs;

#[derive(Debug, Clone)]
enum Entry {
    Geometries { geometries: Vec<Geometry<f64>>, crs: Crs },
    Failing(String),
}

/// Ordered restriction layers held in memory.
///
/// Layers are validated and reprojected on every load, the same way a
/// dataset-backed catalog does it.
///
/// ```
/// use geo::{polygon, Geometry};
/// use interdictus::catalog::{LayerCatalog, MemoryCatalog};
///
/// let catalog = MemoryCatalog::new()
///     .with_layer("ti_sirgas", vec![Geometry::Polygon(polygon![
///         (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0),
///     ])])
///     .with_failing_layer("broken", "unreadable");
/// assert_eq!(catalog.list_layers().unwrap(), vec!["ti_sirgas", "broken"]);
/// assert!(catalog.load_layer("broken").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    layers: Vec<(String, Entry)>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer whose geometries are in EPSG:4326.
    pub fn with_layer(self, id: impl Into<String>, geometries: Vec<Geometry<f64>>) -> Self {
        self.with_projected_layer(id, geometries, Crs::Wgs84)
    }

    /// Add a layer whose geometries are in `crs`.
    pub fn with_projected_layer(
        mut self,
        id: impl Into<String>,
        geometries: Vec<Geometry<f64>>,
        crs: Crs,
    ) -> Self {
        self.layers
            .push((id.into(), Entry::Geometries { geometries, crs }));
        self
    }

    /// Add a layer that is listed but always fails to load.
    pub fn with_failing_layer(mut self, id: impl Into<String>, reason: impl Into<String>) -> Self {
        self.layers.push((id.into(), Entry::Failing(reason.into())));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl LayerCatalog for MemoryCatalog {
    fn list_layers(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.layers.iter().map(|(id, _)| id.clone()).collect())
    }

    fn load_layer(&self, id: &str) -> Result<Arc<RestrictionLayer>, LayerLoadError> {
        let entry = self
            .layers
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, entry)| entry)
            .ok_or_else(|| LayerLoadError::new(id, LayerFailure::Missing))?;

        match entry {
            Entry::Geometries { geometries, crs } => {
                RestrictionLayer::from_source(id, geometries.clone(), *crs).map(Arc::new)
            }
            Entry::Failing(reason) => Err(LayerLoadError::new(
                id,
                LayerFailure::Source(reason.clone()),
            )),
        }
    }

    fn describe(&self) -> String {
        format!("in-memory catalog ({} layers)", self.layers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_layer() {
        let err = MemoryCatalog::new().load_layer("ti").unwrap_err();
        assert!(matches!(err.failure, LayerFailure::Missing));
    }

    #[test]
    fn test_failing_layer_carries_reason() {
        let catalog = MemoryCatalog::new().with_failing_layer("cnfp_am", "disk error");
        let err = catalog.load_layer("cnfp_am").unwrap_err();
        assert_eq!(err.layer, "cnfp_am");
        assert!(err.to_string().contains("disk error"));
    }

    #[test]
    fn test_empty_layer_loads() {
        let catalog = MemoryCatalog::new().with_layer("empty", Vec::new());
        let layer = catalog.load_layer("empty").unwrap();
        assert!(layer.is_empty());
        assert_eq!(catalog.len(), 1);
    }
}
