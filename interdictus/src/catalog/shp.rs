//! Shapefile-directory catalog adapter.
//!
//! A restriction dataset may also be shipped as a folder tree of ESRI
//! shapefiles, one layer per `.shp`. Subfolders are walked recursively and
//! the file stem becomes the layer id. Only geometry is read; attribute
//! tables (`.dbf`) and their text encoding are never touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use geo::Geometry;
use parking_lot::RwLock;
use walkdir::WalkDir;

use super::{
    CatalogError, DatasetFingerprint, LayerCatalog, LayerFailure, LayerLoadError,
    RestrictionLayer,
};
use crate::geometry::Crs;

/// One discovered shapefile.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ShapefileEntry {
    id: String,
    path: PathBuf,
}

/// Restriction layers stored as `.shp` files under a directory tree.
///
/// Layers are listed in path order. A stem shared by files in different
/// folders is disambiguated with its path relative to the root
/// (`federal/limite`), so ids stay unique.
///
/// The source CRS of each file comes from the sibling `.prj`. A file without
/// one is taken to be EPSG:4326.
#[derive(Debug)]
pub struct ShapefileDirCatalog {
    root: PathBuf,
    index: RwLock<Option<Vec<ShapefileEntry>>>,
}

impl ShapefileDirCatalog {
    /// Open a directory of shapefiles.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            return Err(CatalogError::NotFound(root));
        }
        if !root.is_dir() {
            return Err(CatalogError::NotADirectory(root));
        }
        tracing::debug!(path = %root.display(), "Opened shapefile directory catalog");
        Ok(Self {
            root,
            index: RwLock::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and rebuild the id index.
    fn scan(&self) -> Result<Vec<ShapefileEntry>, CatalogError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && has_extension(entry.path(), "shp") {
                paths.push(entry.into_path());
            }
        }

        let mut stems: HashMap<String, usize> = HashMap::new();
        for path in &paths {
            *stems.entry(file_stem(path)).or_default() += 1;
        }

        let entries: Vec<ShapefileEntry> = paths
            .into_iter()
            .map(|path| {
                let stem = file_stem(&path);
                let id = if stems.get(&stem).copied().unwrap_or(0) > 1 {
                    relative_id(&self.root, &path)
                } else {
                    stem
                };
                ShapefileEntry { id, path }
            })
            .collect();

        tracing::debug!(
            path = %self.root.display(),
            layers = entries.len(),
            "Scanned shapefile directory"
        );
        *self.index.write() = Some(entries.clone());
        Ok(entries)
    }

    fn resolve(&self, id: &str) -> Result<PathBuf, LayerFailure> {
        let cached = self
            .index
            .read()
            .as_ref()
            .and_then(|entries| entries.iter().find(|e| e.id == id).map(|e| e.path.clone()));
        if let Some(path) = cached {
            return Ok(path);
        }

        let entries = self
            .scan()
            .map_err(|e| LayerFailure::Source(e.to_string()))?;
        entries
            .into_iter()
            .find(|e| e.id == id)
            .map(|e| e.path)
            .ok_or(LayerFailure::Missing)
    }

    fn load(&self, id: &str) -> Result<RestrictionLayer, LayerFailure> {
        let path = self.resolve(id)?;
        let crs = read_crs(&path)?;

        let shapes = ::shapefile::read_shapes(&path)
            .map_err(|e| LayerFailure::Source(format!("{}: {}", path.display(), e)))?;

        let mut geometries = Vec::with_capacity(shapes.len());
        let mut unconvertible = 0;
        for shape in shapes {
            if matches!(shape, ::shapefile::Shape::NullShape) {
                continue;
            }
            match Geometry::<f64>::try_from(shape) {
                Ok(geometry) => geometries.push(geometry),
                Err(_) => unconvertible += 1,
            }
        }

        RestrictionLayer::from_source(id, geometries, crs)
            .map(|layer| layer.with_extra_dropped(unconvertible))
            .map_err(|e| e.failure)
    }
}

impl LayerCatalog for ShapefileDirCatalog {
    fn list_layers(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.scan()?.into_iter().map(|e| e.id).collect())
    }

    fn load_layer(&self, id: &str) -> Result<Arc<RestrictionLayer>, LayerLoadError> {
        self.load(id)
            .map(Arc::new)
            .map_err(|failure| LayerLoadError::new(id, failure))
    }

    /// Combined size and newest modification time of the `.shp` and `.prj`
    /// files in the tree.
    fn fingerprint(&self) -> Option<DatasetFingerprint> {
        let mut len = 0;
        let mut modified: Option<SystemTime> = None;
        for entry in WalkDir::new(&self.root).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if !(has_extension(path, "shp") || has_extension(path, "prj")) {
                continue;
            }
            let meta = entry.metadata().ok()?;
            len += meta.len();
            if let Ok(time) = meta.modified() {
                modified = Some(modified.map_or(time, |m| m.max(time)));
            }
        }
        Some(DatasetFingerprint { len, modified })
    }

    fn describe(&self) -> String {
        format!("Shapefile directory {}", self.root.display())
    }
}

/// CRS declared by the `.prj` next to a shapefile.
fn read_crs(shp: &Path) -> Result<Crs, LayerFailure> {
    let Some(prj) = sibling_with_extension(shp, "prj") else {
        tracing::debug!(path = %shp.display(), "No .prj, assuming EPSG:4326");
        return Ok(Crs::Wgs84);
    };
    let bytes = std::fs::read(&prj)
        .map_err(|e| LayerFailure::Source(format!("{}: {}", prj.display(), e)))?;
    Ok(Crs::from_wkt(&String::from_utf8_lossy(&bytes)))
}

/// `path` with its extension swapped for `ext` in either case, if it exists.
fn sibling_with_extension(path: &Path, ext: &str) -> Option<PathBuf> {
    [ext.to_ascii_lowercase(), ext.to_ascii_uppercase()]
        .into_iter()
        .map(|e| path.with_extension(e))
        .find(|p| p.is_file())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn relative_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SHAPE_NULL: i32 = 0;
    const SHAPE_POLYLINE: i32 = 3;
    const SHAPE_POLYGON: i32 = 5;

    const SIRGAS_UTM_23S: &str = r#"PROJCS["SIRGAS_2000_UTM_Zone_23S",GEOGCS["GCS_SIRGAS_2000",DATUM["D_SIRGAS_2000",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",10000000.0],PARAMETER["Central_Meridian",-45.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    /// A record to write: shape type and, for poly types, its rings.
    type Record = (i32, Vec<Vec<(f64, f64)>>);

    fn square(x: f64, y: f64, size: f64) -> Vec<(f64, f64)> {
        // Shapefile outer rings run clockwise.
        vec![
            (x, y),
            (x, y + size),
            (x + size, y + size),
            (x + size, y),
            (x, y),
        ]
    }

    fn bbox(records: &[Record]) -> [f64; 4] {
        let mut b = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
        for (_, rings) in records {
            for &(x, y) in rings.iter().flatten() {
                b[0] = b[0].min(x);
                b[1] = b[1].min(y);
                b[2] = b[2].max(x);
                b[3] = b[3].max(y);
            }
        }
        if b[0] > b[2] {
            return [0.0; 4];
        }
        b
    }

    fn record_content(shape_type: i32, rings: &[Vec<(f64, f64)>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&shape_type.to_le_bytes());
        if shape_type == SHAPE_NULL {
            return out;
        }
        let points: Vec<(f64, f64)> = rings.iter().flatten().copied().collect();
        for v in bbox(&[(shape_type, rings.to_vec())]) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&(rings.len() as i32).to_le_bytes());
        out.extend_from_slice(&(points.len() as i32).to_le_bytes());
        let mut start = 0i32;
        for ring in rings {
            out.extend_from_slice(&start.to_le_bytes());
            start += ring.len() as i32;
        }
        for (x, y) in points {
            out.extend_from_slice(&x.to_le_bytes());
            out.extend_from_slice(&y.to_le_bytes());
        }
        out
    }

    /// Write a `.shp` with the given records (no index or attribute table).
    fn write_shp(path: &Path, records: &[Record]) {
        let mut body = Vec::new();
        for (i, (shape_type, rings)) in records.iter().enumerate() {
            let content = record_content(*shape_type, rings);
            body.extend_from_slice(&(i as i32 + 1).to_be_bytes());
            body.extend_from_slice(&((content.len() / 2) as i32).to_be_bytes());
            body.extend_from_slice(&content);
        }

        let file_shape_type = records.first().map_or(SHAPE_POLYGON, |r| r.0);
        let mut header = Vec::with_capacity(100);
        header.extend_from_slice(&9994i32.to_be_bytes());
        header.extend_from_slice(&[0u8; 20]);
        header.extend_from_slice(&(((100 + body.len()) / 2) as i32).to_be_bytes());
        header.extend_from_slice(&1000i32.to_le_bytes());
        header.extend_from_slice(&file_shape_type.to_le_bytes());
        for v in bbox(records) {
            header.extend_from_slice(&v.to_le_bytes());
        }
        header.extend_from_slice(&[0u8; 32]);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, [header, body].concat()).unwrap();
    }

    fn polygon_layer(path: &Path, squares: &[(f64, f64, f64)]) {
        let records: Vec<Record> = squares
            .iter()
            .map(|&(x, y, s)| (SHAPE_POLYGON, vec![square(x, y, s)]))
            .collect();
        write_shp(path, &records);
    }

    #[test]
    fn test_open_rejects_missing_and_files() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            ShapefileDirCatalog::open(temp.path().join("none")),
            Err(CatalogError::NotFound(_))
        ));

        let file = temp.path().join("file.shp");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            ShapefileDirCatalog::open(&file),
            Err(CatalogError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_lists_shapefiles_recursively_by_stem() {
        let temp = TempDir::new().unwrap();
        polygon_layer(&temp.path().join("terras/terra_indigena_ma.shp"), &[(0.0, 0.0, 1.0)]);
        polygon_layer(&temp.path().join("cnfp_pa.SHP"), &[(0.0, 0.0, 1.0)]);
        polygon_layer(&temp.path().join("a/b/quilombos.shp"), &[(0.0, 0.0, 1.0)]);
        fs::write(temp.path().join("terras/terra_indigena_ma.dbf"), b"").unwrap();
        fs::write(temp.path().join("readme.txt"), b"notes").unwrap();

        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        let ids = catalog.list_layers().unwrap();
        assert_eq!(ids, vec!["quilombos", "cnfp_pa", "terra_indigena_ma"]);
    }

    #[test]
    fn test_duplicate_stems_use_relative_paths() {
        let temp = TempDir::new().unwrap();
        polygon_layer(&temp.path().join("estadual/limite.shp"), &[(0.0, 0.0, 1.0)]);
        polygon_layer(&temp.path().join("federal/limite.shp"), &[(0.0, 0.0, 1.0)]);

        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        let ids = catalog.list_layers().unwrap();
        assert_eq!(ids, vec!["estadual/limite", "federal/limite"]);
        assert_eq!(catalog.load_layer("federal/limite").unwrap().len(), 1);
    }

    #[test]
    fn test_load_keeps_polygons_and_skips_null_shapes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ti_sirgas.shp");
        write_shp(
            &path,
            &[
                (SHAPE_POLYGON, vec![square(0.0, 0.0, 1.0)]),
                (SHAPE_NULL, Vec::new()),
                (SHAPE_POLYGON, vec![square(5.0, 5.0, 2.0), {
                    let mut hole = square(5.5, 5.5, 0.5);
                    hole.reverse();
                    hole
                }]),
            ],
        );

        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        let layer = catalog.load_layer("ti_sirgas").unwrap();
        assert_eq!(layer.id(), "ti_sirgas");
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.dropped(), 0);
    }

    #[test]
    fn test_polyline_layer_is_empty_not_failed() {
        let temp = TempDir::new().unwrap();
        write_shp(
            &temp.path().join("rodovias.shp"),
            &[(SHAPE_POLYLINE, vec![vec![(0.0, 0.0), (1.0, 1.0)]])],
        );

        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        let layer = catalog.load_layer("rodovias").unwrap();
        assert!(layer.is_empty());
        assert_eq!(layer.dropped(), 1);
    }

    #[test]
    fn test_projected_layer_is_reprojected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("uc_federal.shp");
        polygon_layer(&path, &[(500_000.0, 9_000_000.0, 1_000.0)]);
        fs::write(path.with_extension("prj"), SIRGAS_UTM_23S).unwrap();

        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        let layer = catalog.load_layer("uc_federal").unwrap();
        assert_eq!(layer.len(), 1);

        let rect = geo::BoundingRect::bounding_rect(&layer.features()[0]).unwrap();
        assert!((rect.min().x + 45.0).abs() < 0.01, "lon {}", rect.min().x);
        assert!(rect.min().y < -8.9 && rect.min().y > -9.1, "lat {}", rect.min().y);
    }

    #[test]
    fn test_unknown_prj_fails_layer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("assentamentos.shp");
        polygon_layer(&path, &[(0.0, 0.0, 1.0)]);
        fs::write(
            path.with_extension("prj"),
            r#"PROJCS["South_America_Albers_Equal_Area_Conic",GEOGCS["GCS_South_American_1969"]]"#,
        )
        .unwrap();

        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        let err = catalog.load_layer("assentamentos").unwrap_err();
        assert_eq!(err.layer, "assentamentos");
        assert!(matches!(err.failure, LayerFailure::Reprojection(_)));
    }

    #[test]
    fn test_corrupt_and_missing_layers() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("broken.shp"), b"not a shapefile").unwrap();

        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        assert!(matches!(
            catalog.load_layer("broken").unwrap_err().failure,
            LayerFailure::Source(_)
        ));
        assert!(matches!(
            catalog.load_layer("absent").unwrap_err().failure,
            LayerFailure::Missing
        ));
    }

    #[test]
    fn test_fingerprint_tracks_new_files() {
        let temp = TempDir::new().unwrap();
        polygon_layer(&temp.path().join("ti.shp"), &[(0.0, 0.0, 1.0)]);
        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        let before = catalog.fingerprint().unwrap();

        polygon_layer(&temp.path().join("quilombos.shp"), &[(0.0, 0.0, 1.0)]);
        assert_ne!(catalog.fingerprint().unwrap(), before);
    }

    #[test]
    fn test_analysis_over_shapefile_tree() {
        use crate::analysis::{AnalysisConfig, Analyzer, Verdict};
        use crate::geometry::GeometrySet;
        use crate::labels::{LabelRules, INDIGENOUS_LAND};
        use tokio_util::sync::CancellationToken;
        use geo::polygon;

        let temp = TempDir::new().unwrap();
        polygon_layer(&temp.path().join("funai/terra_indigena_xx.shp"), &[(0.5, 0.5, 1.0)]);
        polygon_layer(&temp.path().join("sfb/cnfp_pa.shp"), &[(10.0, 10.0, 1.0)]);
        fs::write(temp.path().join("sfb/corrupt.shp"), b"garbage").unwrap();

        let user = GeometrySet::from_source(
            vec![Geometry::Polygon(geo::polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ])],
            Crs::Wgs84,
        )
        .unwrap();

        let catalog = ShapefileDirCatalog::open(temp.path()).unwrap();
        let report = Analyzer::new(AnalysisConfig::default(), LabelRules::default())
            .run(&user, &catalog, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.verdict, Verdict::Alert);
        let labels: Vec<&str> = report.labels.iter().map(|l| l.as_str()).collect();
        assert_eq!(labels, vec![INDIGENOUS_LAND]);
        assert_eq!(report.skipped_ids(), vec!["corrupt"]);
        assert_eq!(report.layers_checked, 2);
    }
}
