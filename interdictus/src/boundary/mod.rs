//! Boundary file loading.
//!
//! Turns an uploaded boundary file into a [`GeometrySet`]. Two containers are
//! understood: a bare KML document and a KMZ archive holding one. Loading is
//! all-or-nothing: a [`LoadError`] means no analysis can run.
//!
//! # Example
//!
//! ```
//! use interdictus::boundary::load_boundary;
//!
//! let kml = br#"<kml><Placemark><Polygon><outerBoundaryIs><LinearRing>
//!     <coordinates>0,0 1,0 1,1 0,1 0,0</coordinates>
//! </LinearRing></outerBoundaryIs></Polygon></Placemark></kml>"#;
//!
//! let set = load_boundary(kml, "area.kml").unwrap();
//! assert_eq!(set.len(), 1);
//! ```

mod archive;
mod kml;

pub use archive::extract_kml_member;
pub use kml::{parse_coordinates, KmlDocument, KmlFeature, KmlGeometry};

use std::path::Path;

use thiserror::Error;

use crate::geometry::{Crs, GeometrySet, ReprojectionError};

/// Why a boundary file could not be turned into geometry.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The filename names a format this loader does not read.
    #[error("Unsupported boundary file format: '{0}' (expected .kml or .kmz)")]
    UnsupportedFormat(String),

    /// The KMZ container is not a readable zip archive.
    #[error("Failed to read KMZ archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The KMZ archive holds no `.kml` member.
    #[error("KMZ archive contains no .kml document")]
    NoMarkupMember,

    /// Reading the boundary bytes failed.
    #[error("Failed to read boundary file: {0}")]
    Io(#[from] std::io::Error),

    /// The markup is not UTF-8 text.
    #[error("Boundary document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The markup is not a well-formed feature tree.
    #[error("Boundary document could not be parsed: {0}")]
    Markup(String),

    /// No feature in the tree exposes a geometry.
    #[error("Boundary document contains no geometry")]
    NoGeometry,

    /// Geometries were found but every one of them failed validation.
    #[error("Boundary document contains no valid geometry ({discarded} discarded as invalid)")]
    NoValidGeometry { discarded: usize },

    /// The declared source CRS cannot be transformed.
    #[error("Boundary geometry could not be reprojected: {0}")]
    Reprojection(#[from] ReprojectionError),
}

/// Container kind of an uploaded boundary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryFormat {
    /// Single KML markup document.
    Kml,
    /// Zip archive containing a KML document.
    Kmz,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

impl BoundaryFormat {
    /// Pick the container kind from the filename hint, sniffing the bytes
    /// when the hint carries no extension.
    pub fn detect(filename_hint: &str, bytes: &[u8]) -> Result<Self, LoadError> {
        let extension = Path::new(filename_hint)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        match extension.as_deref() {
            Some("kml") => Ok(BoundaryFormat::Kml),
            Some("kmz") => Ok(BoundaryFormat::Kmz),
            Some(other) => Err(LoadError::UnsupportedFormat(format!(".{}", other))),
            None if bytes.starts_with(ZIP_MAGIC) => Ok(BoundaryFormat::Kmz),
            None => Ok(BoundaryFormat::Kml),
        }
    }
}

/// Pluggable boundary loading adapter.
pub trait BoundarySource: Send + Sync {
    /// Load a boundary upload into a geometry set in EPSG:4326.
    fn load(&self, bytes: &[u8], filename_hint: &str) -> Result<GeometrySet, LoadError>;
}

/// Loader for KML and KMZ uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct KmlBoundaryLoader;

impl BoundarySource for KmlBoundaryLoader {
    fn load(&self, bytes: &[u8], filename_hint: &str) -> Result<GeometrySet, LoadError> {
        let format = BoundaryFormat::detect(filename_hint, bytes)?;

        let markup = match format {
            BoundaryFormat::Kml => bytes.to_vec(),
            BoundaryFormat::Kmz => extract_kml_member(bytes)?,
        };

        let text = std::str::from_utf8(strip_bom(&markup))?;
        let document = KmlDocument::parse(text)?;
        let geometries = document.geometries();

        tracing::debug!(
            format = ?format,
            placemarks = document.placemark_count(),
            geometries = geometries.len(),
            "Parsed boundary document"
        );

        if geometries.is_empty() {
            return Err(LoadError::NoGeometry);
        }

        // KML coordinates are WGS84 by definition.
        let set = GeometrySet::from_source(geometries, Crs::Wgs84)?;
        if set.is_empty() {
            return Err(LoadError::NoValidGeometry {
                discarded: set.discarded(),
            });
        }
        if set.discarded() > 0 {
            tracing::warn!(
                discarded = set.discarded(),
                kept = set.len(),
                "Discarded invalid boundary geometries"
            );
        }
        Ok(set)
    }
}

/// Load a boundary upload with the default KML/KMZ loader.
pub fn load_boundary(bytes: &[u8], filename_hint: &str) -> Result<GeometrySet, LoadError> {
    KmlBoundaryLoader.load(bytes, filename_hint)
}

/// Read and load a boundary file from disk.
pub fn load_boundary_file(path: &Path) -> Result<GeometrySet, LoadError> {
    let bytes = std::fs::read(path)?;
    let hint = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    load_boundary(&bytes, &hint)
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const SQUARE_KML: &str = r#"<kml><Document><Placemark><Polygon><outerBoundaryIs><LinearRing>
        <coordinates>0,0 1,0 1,1 0,1 0,0</coordinates>
    </LinearRing></outerBoundaryIs></Polygon></Placemark></Document></kml>"#;

    fn kmz(members: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(
            BoundaryFormat::detect("Area.KML", b"").unwrap(),
            BoundaryFormat::Kml
        );
        assert_eq!(
            BoundaryFormat::detect("area.kmz", b"").unwrap(),
            BoundaryFormat::Kmz
        );
        assert!(matches!(
            BoundaryFormat::detect("area.shp", b""),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_detect_sniffs_zip_without_extension() {
        assert_eq!(
            BoundaryFormat::detect("upload", b"PK\x03\x04rest").unwrap(),
            BoundaryFormat::Kmz
        );
        assert_eq!(
            BoundaryFormat::detect("upload", b"<kml/>").unwrap(),
            BoundaryFormat::Kml
        );
    }

    #[test]
    fn test_load_kml() {
        let set = load_boundary(SQUARE_KML.as_bytes(), "farm.kml").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.discarded(), 0);
    }

    #[test]
    fn test_load_kml_with_bom() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(SQUARE_KML.as_bytes());
        assert_eq!(load_boundary(&bytes, "farm.kml").unwrap().len(), 1);
    }

    #[test]
    fn test_load_kmz_uses_first_kml_member() {
        let bytes = kmz(&[
            ("files/icon.png", "not an image"),
            ("doc.KML", SQUARE_KML),
            ("other.kml", "<kml/>"),
        ]);
        let set = load_boundary(&bytes, "farm.kmz").unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_kmz_without_kml_member() {
        let bytes = kmz(&[("readme.txt", "hello")]);
        assert!(matches!(
            load_boundary(&bytes, "farm.kmz"),
            Err(LoadError::NoMarkupMember)
        ));
    }

    #[test]
    fn test_corrupt_kmz() {
        assert!(matches!(
            load_boundary(b"definitely not a zip", "farm.kmz"),
            Err(LoadError::Archive(_))
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            load_boundary(b"<kml>\xff\xfe</kml>", "farm.kml"),
            Err(LoadError::Encoding(_))
        ));
    }

    #[test]
    fn test_no_geometry() {
        let err = load_boundary(
            b"<kml><Document><Placemark><name>x</name></Placemark></Document></kml>",
            "farm.kml",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::NoGeometry));
    }

    #[test]
    fn test_only_invalid_geometry() {
        let bowtie = r#"<kml><Placemark><Polygon><outerBoundaryIs><LinearRing>
            <coordinates>0,0 1,1 1,0 0,1 0,0</coordinates>
        </LinearRing></outerBoundaryIs></Polygon></Placemark></kml>"#;
        let err = load_boundary(bowtie.as_bytes(), "farm.kml").unwrap_err();
        assert!(matches!(err, LoadError::NoValidGeometry { discarded: 1 }));
    }

    #[test]
    fn test_mixed_valid_and_invalid_keeps_valid() {
        let doc = r#"<kml><Document>
            <Placemark><Polygon><outerBoundaryIs><LinearRing>
                <coordinates>0,0 1,1 1,0 0,1 0,0</coordinates>
            </LinearRing></outerBoundaryIs></Polygon></Placemark>
            <Placemark><Polygon><outerBoundaryIs><LinearRing>
                <coordinates>0,0 1,0 1,1 0,1 0,0</coordinates>
            </LinearRing></outerBoundaryIs></Polygon></Placemark>
        </Document></kml>"#;
        let set = load_boundary(doc.as_bytes(), "farm.kml").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.discarded(), 1);
    }

    #[test]
    fn test_load_boundary_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("area.kml");
        std::fs::write(&path, SQUARE_KML).unwrap();
        assert_eq!(load_boundary_file(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_load_boundary_file_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            load_boundary_file(&dir.path().join("missing.kml")),
            Err(LoadError::Io(_))
        ));
    }
}
