//! GeoPackage (SQLite) catalog adapter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags, OptionalExtension};

use super::wkb::decode_gpkg_blob;
use super::{
    CatalogError, DatasetFingerprint, LayerCatalog, LayerFailure, LayerLoadError,
    RestrictionLayer,
};
use crate::geometry::Crs;

/// GeoPackage `srs_id` for "undefined geographic".
const UNDEFINED_GEOGRAPHIC_SRS: i32 = 0;

/// Restriction layers stored as feature tables of a GeoPackage file.
///
/// Each call to [`load_layer`](LayerCatalog::load_layer) opens its own
/// read-only connection, so loads on different threads share no state.
#[derive(Debug, Clone)]
pub struct GeoPackageCatalog {
    path: PathBuf,
}

impl GeoPackageCatalog {
    /// Open a GeoPackage and check that it has a `gpkg_contents` table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(CatalogError::NotFound(path));
        }

        let catalog = Self { path };
        let conn = catalog.connect().map_err(|source| CatalogError::Open {
            path: catalog.path.clone(),
            source,
        })?;

        let has_contents: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'gpkg_contents'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(|source| CatalogError::Open {
                path: catalog.path.clone(),
                source,
            })?;
        if !has_contents {
            return Err(CatalogError::NotGeoPackage(catalog.path));
        }

        tracing::debug!(path = %catalog.path.display(), "Opened GeoPackage catalog");
        Ok(catalog)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    fn load(&self, id: &str) -> Result<RestrictionLayer, LayerFailure> {
        let conn = self.connect()?;

        let listed: Option<String> = conn
            .query_row(
                "SELECT table_name FROM gpkg_contents WHERE table_name = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        if listed.is_none() {
            return Err(LayerFailure::Missing);
        }

        let column: Option<(String, i32)> = conn
            .query_row(
                "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((column, srs_id)) = column else {
            return Err(LayerFailure::NoGeometryColumn);
        };

        let crs = Crs::from_epsg(resolve_epsg(&conn, srs_id)?);

        let sql = format!(
            "SELECT {} FROM {}",
            quote_identifier(&column),
            quote_identifier(id)
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut geometries = Vec::new();
        let mut undecodable = 0;
        while let Some(row) = rows.next()? {
            let Some(blob) = row.get::<_, Option<Vec<u8>>>(0)? else {
                continue;
            };
            match decode_gpkg_blob(&blob) {
                Ok(Some(geometry)) => geometries.push(geometry),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(layer = %id, error = %e, "Skipping undecodable feature");
                    undecodable += 1;
                }
            }
        }

        RestrictionLayer::from_source(id, geometries, crs)
            .map(|layer| layer.with_extra_dropped(undecodable))
            .map_err(|e| e.failure)
    }
}

impl LayerCatalog for GeoPackageCatalog {
    fn list_layers(&self) -> Result<Vec<String>, CatalogError> {
        let conn = self.connect().map_err(|source| CatalogError::Open {
            path: self.path.clone(),
            source,
        })?;
        let mut stmt = conn.prepare(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn load_layer(&self, id: &str) -> Result<Arc<RestrictionLayer>, LayerLoadError> {
        self.load(id)
            .map(Arc::new)
            .map_err(|failure| LayerLoadError::new(id, failure))
    }

    fn fingerprint(&self) -> Option<DatasetFingerprint> {
        let meta = std::fs::metadata(&self.path).ok()?;
        Some(DatasetFingerprint {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    fn describe(&self) -> String {
        format!("GeoPackage {}", self.path.display())
    }
}

/// Map a GeoPackage `srs_id` to an EPSG code.
///
/// Definitions registered under the EPSG organization use their
/// organization code. Unknown ids are taken to be EPSG codes themselves.
fn resolve_epsg(conn: &Connection, srs_id: i32) -> Result<i32, LayerFailure> {
    if srs_id == UNDEFINED_GEOGRAPHIC_SRS {
        return Ok(crate::geometry::CANONICAL_EPSG);
    }
    let definition: Option<(String, i32)> = conn
        .query_row(
            "SELECT organization, organization_coordsys_id FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            [srs_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match definition {
        Some((org, code)) if org.eq_ignore_ascii_case("epsg") => code,
        _ => srs_id,
    })
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::wkb::encode_gpkg_blob;
    use geo::{polygon, Geometry};
    use tempfile::TempDir;

    fn square(x: f64, y: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
            (x: x, y: y),
        ])
    }

    fn create_dataset(path: &Path) -> Connection {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE gpkg_spatial_ref_sys (
                 srs_name TEXT NOT NULL, srs_id INTEGER PRIMARY KEY,
                 organization TEXT NOT NULL, organization_coordsys_id INTEGER NOT NULL,
                 definition TEXT NOT NULL, description TEXT);
             CREATE TABLE gpkg_contents (
                 table_name TEXT PRIMARY KEY, data_type TEXT NOT NULL, identifier TEXT);
             CREATE TABLE gpkg_geometry_columns (
                 table_name TEXT NOT NULL, column_name TEXT NOT NULL,
                 geometry_type_name TEXT NOT NULL, srs_id INTEGER NOT NULL,
                 z TINYINT NOT NULL, m TINYINT NOT NULL);
             INSERT INTO gpkg_spatial_ref_sys VALUES ('WGS 84', 4326, 'EPSG', 4326, '', NULL);
             INSERT INTO gpkg_spatial_ref_sys VALUES ('custom', 99001, 'NONE', 99001, '', NULL);",
        )
        .unwrap();
        conn
    }

    fn add_layer(conn: &Connection, name: &str, srs_id: i32, blobs: &[Option<Vec<u8>>]) {
        conn.execute(
            &format!("CREATE TABLE \"{name}\" (fid INTEGER PRIMARY KEY, geom BLOB)"),
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO gpkg_contents VALUES (?1, 'features', ?1)",
            [name],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO gpkg_geometry_columns VALUES (?1, 'geom', 'GEOMETRY', ?2, 0, 0)",
            rusqlite::params![name, srs_id],
        )
        .unwrap();
        for blob in blobs {
            conn.execute(
                &format!("INSERT INTO \"{name}\" (geom) VALUES (?1)"),
                [blob],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_open_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = GeoPackageCatalog::open(temp.path().join("none.gpkg")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_open_plain_sqlite_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plain.sqlite");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER);")
            .unwrap();
        let err = GeoPackageCatalog::open(&path).unwrap_err();
        assert!(matches!(err, CatalogError::NotGeoPackage(_)));
    }

    #[test]
    fn test_lists_feature_tables_in_insertion_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restrictions.gpkg");
        let conn = create_dataset(&path);
        add_layer(&conn, "ti_sirgas", 4326, &[]);
        add_layer(&conn, "cnfp_pa", 4326, &[]);
        add_layer(&conn, "areas_quilombolas", 4326, &[]);
        conn.execute(
            "INSERT INTO gpkg_contents VALUES ('basemap', 'tiles', 'basemap')",
            [],
        )
        .unwrap();
        drop(conn);

        let catalog = GeoPackageCatalog::open(&path).unwrap();
        assert_eq!(
            catalog.list_layers().unwrap(),
            vec!["ti_sirgas", "cnfp_pa", "areas_quilombolas"]
        );
        assert!(catalog.fingerprint().is_some());
    }

    #[test]
    fn test_load_layer_skips_null_and_corrupt_features() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restrictions.gpkg");
        let conn = create_dataset(&path);
        add_layer(
            &conn,
            "ti_sirgas",
            4326,
            &[
                Some(encode_gpkg_blob(&square(0.0, 0.0), 4326)),
                None,
                Some(b"GPgarbage".to_vec()),
                Some(encode_gpkg_blob(&square(3.0, 3.0), 4326)),
            ],
        );
        drop(conn);

        let catalog = GeoPackageCatalog::open(&path).unwrap();
        let layer = catalog.load_layer("ti_sirgas").unwrap();
        assert_eq!(layer.id(), "ti_sirgas");
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.dropped(), 1);
    }

    #[test]
    fn test_load_missing_layer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restrictions.gpkg");
        drop(create_dataset(&path));

        let catalog = GeoPackageCatalog::open(&path).unwrap();
        let err = catalog.load_layer("nope").unwrap_err();
        assert_eq!(err.layer, "nope");
        assert!(matches!(err.failure, LayerFailure::Missing));
    }

    #[test]
    fn test_unsupported_srs_fails_layer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restrictions.gpkg");
        let conn = create_dataset(&path);
        add_layer(
            &conn,
            "uc_federal",
            99001,
            &[Some(encode_gpkg_blob(&square(0.0, 0.0), 99001))],
        );
        drop(conn);

        let catalog = GeoPackageCatalog::open(&path).unwrap();
        let err = catalog.load_layer("uc_federal").unwrap_err();
        assert!(matches!(err.failure, LayerFailure::Reprojection(_)));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("ti"), "\"ti\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
