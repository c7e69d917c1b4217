//! Restriction-layer catalogs.
//!
//! A [`LayerCatalog`] lists the identifiers of the available restriction
//! layers and loads each one on demand as a [`RestrictionLayer`] whose
//! features are valid polygons in EPSG:4326. Loading is independent per
//! layer so that callers can fan loads out across threads and isolate
//! failures.
//!
//! Adapters:
//!
//! - [`GeoPackageCatalog`]: a SQLite GeoPackage dataset on disk
//! - [`ShapefileDirCatalog`]: a folder tree of shapefiles, one layer per file
//! - [`MemoryCatalog`]: layers held in memory, for embedding and tests
//! - [`CachedCatalog`]: memoizes loaded layers of any other catalog

mod cache;
mod gpkg;
mod memory;
mod shp;
pub mod wkb;

pub use cache::CachedCatalog;
pub use gpkg::GeoPackageCatalog;
pub use memory::MemoryCatalog;
pub use shp::ShapefileDirCatalog;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use geo::{Geometry, MultiPolygon};
use thiserror::Error;

use crate::geometry::{is_polygonal, is_valid, reproject, to_multi_polygon, Crs, ReprojectionError};

/// Errors that prevent the catalog itself from being read.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Dataset not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to open dataset '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("'{0}' is not a GeoPackage (no gpkg_contents table)")]
    NotGeoPackage(PathBuf),

    #[error("Failed to query dataset: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("Failed to scan dataset directory: {0}")]
    Scan(#[from] walkdir::Error),
}

/// Open a restriction dataset with the adapter that fits its path.
///
/// A directory is read as a shapefile tree; anything else as a GeoPackage.
pub fn open_dataset(path: impl AsRef<Path>) -> Result<Arc<dyn LayerCatalog>, CatalogError> {
    let path = path.as_ref();
    if path.is_dir() {
        Ok(Arc::new(ShapefileDirCatalog::open(path)?))
    } else {
        Ok(Arc::new(GeoPackageCatalog::open(path)?))
    }
}

/// Why a single layer could not be loaded.
#[derive(Debug, Error)]
pub enum LayerFailure {
    #[error("layer does not exist in the dataset")]
    Missing,

    #[error("layer has no geometry column")]
    NoGeometryColumn,

    #[error("dataset query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("{0}")]
    Reprojection(#[from] ReprojectionError),

    #[error("{0}")]
    Source(String),
}

/// A layer load failure, naming the layer it belongs to.
#[derive(Debug, Error)]
#[error("Failed to load layer '{layer}': {failure}")]
pub struct LayerLoadError {
    pub layer: String,
    #[source]
    pub failure: LayerFailure,
}

impl LayerLoadError {
    pub fn new(layer: impl Into<String>, failure: impl Into<LayerFailure>) -> Self {
        Self {
            layer: layer.into(),
            failure: failure.into(),
        }
    }
}

/// Identity of the dataset backing a catalog.
///
/// Two fingerprints compare unequal when the dataset has been replaced or
/// modified since the first one was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Source of restriction layers.
pub trait LayerCatalog: Send + Sync {
    /// Identifiers of every available layer, in catalog order.
    fn list_layers(&self) -> Result<Vec<String>, CatalogError>;

    /// Load one layer by identifier.
    fn load_layer(&self, id: &str) -> Result<Arc<RestrictionLayer>, LayerLoadError>;

    /// Current dataset identity, when the catalog has one.
    fn fingerprint(&self) -> Option<DatasetFingerprint> {
        None
    }

    /// Short human-readable description (dataset path, adapter name).
    fn describe(&self) -> String;
}

impl<T: LayerCatalog + ?Sized> LayerCatalog for Arc<T> {
    fn list_layers(&self) -> Result<Vec<String>, CatalogError> {
        (**self).list_layers()
    }

    fn load_layer(&self, id: &str) -> Result<Arc<RestrictionLayer>, LayerLoadError> {
        (**self).load_layer(id)
    }

    fn fingerprint(&self) -> Option<DatasetFingerprint> {
        (**self).fingerprint()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// One loaded restriction layer.
///
/// Features are valid polygons in EPSG:4326. Source features that were not
/// polygonal, failed reprojection, failed validation or could not be decoded
/// are counted in [`dropped`](Self::dropped).
#[derive(Debug, Clone)]
pub struct RestrictionLayer {
    id: String,
    features: Vec<MultiPolygon<f64>>,
    dropped: usize,
}

impl RestrictionLayer {
    /// Build a layer from source geometries expressed in `crs`.
    ///
    /// An unsupported `crs` fails the whole layer.
    pub fn from_source(
        id: impl Into<String>,
        geometries: Vec<Geometry<f64>>,
        crs: Crs,
    ) -> Result<Self, LayerLoadError> {
        let id = id.into();
        if !crs.is_supported() {
            return Err(LayerLoadError::new(
                id,
                ReprojectionError::UnsupportedCrs(crs.epsg()),
            ));
        }

        let mut features = Vec::with_capacity(geometries.len());
        let mut dropped = 0;
        for geometry in geometries {
            if !is_polygonal(&geometry) {
                dropped += 1;
                continue;
            }
            let projected = match reproject(&geometry, crs) {
                Ok(g) => g,
                Err(_) => {
                    dropped += 1;
                    continue;
                }
            };
            match to_multi_polygon(&projected) {
                Some(mp) if is_valid(&projected) => features.push(mp),
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::debug!(
                layer = %id,
                dropped,
                kept = features.len(),
                "Dropped unusable layer features"
            );
        }

        Ok(Self {
            id,
            features,
            dropped,
        })
    }

    pub(crate) fn with_extra_dropped(mut self, extra: usize) -> Self {
        self.dropped += extra;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Always EPSG:4326 once loaded.
    pub fn crs(&self) -> Crs {
        Crs::Wgs84
    }

    pub fn features(&self) -> &[MultiPolygon<f64>] {
        &self.features
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
