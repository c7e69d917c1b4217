//! Geometry primitives shared by every stage of an analysis.
//!
//! All geometries that reach the overlay live in EPSG:4326 and have passed
//! [`is_valid`]. A [`GeometrySet`] is the immutable result of loading one
//! boundary file.

mod crs;
mod validity;

pub use crs::{reproject, Crs, Datum, ReprojectionError, CANONICAL_EPSG};
pub use validity::{
    has_finite_coords, is_polygonal, is_valid, is_valid_polygonal, to_multi_polygon,
};

use geo::{Geometry, MultiPolygon};

/// Ordered geometries from one boundary upload, in EPSG:4326.
///
/// Construct with [`GeometrySet::from_source`], which reprojects and drops
/// geometries that fail validation. The set is never mutated afterwards.
///
/// # Example
///
/// ```
/// use geo::{polygon, Geometry};
/// use interdictus::geometry::{Crs, GeometrySet};
///
/// let square = Geometry::Polygon(polygon![
///     (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0),
/// ]);
/// let set = GeometrySet::from_source(vec![square], Crs::Wgs84).unwrap();
/// assert_eq!(set.len(), 1);
/// assert_eq!(set.polygons().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GeometrySet {
    members: Vec<Geometry<f64>>,
    discarded: usize,
}

impl GeometrySet {
    /// Build a set from geometries expressed in `crs`.
    ///
    /// Geometries that cannot be reprojected or are invalid are dropped and
    /// counted in [`discarded`](Self::discarded). Fails only when the source
    /// CRS itself has no transformation.
    pub fn from_source(
        geometries: Vec<Geometry<f64>>,
        crs: Crs,
    ) -> Result<Self, ReprojectionError> {
        if !crs.is_supported() {
            return Err(ReprojectionError::UnsupportedCrs(crs.epsg()));
        }

        let mut members = Vec::with_capacity(geometries.len());
        let mut discarded = 0;
        for geometry in geometries {
            let projected = match reproject(&geometry, crs) {
                Ok(g) => g,
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping geometry that failed reprojection");
                    discarded += 1;
                    continue;
                }
            };
            if is_valid(&projected) {
                members.push(projected);
            } else {
                discarded += 1;
            }
        }

        Ok(Self { members, discarded })
    }

    /// Build a set from geometries already in EPSG:4326 and already validated.
    pub fn from_valid(members: Vec<Geometry<f64>>) -> Self {
        Self {
            members,
            discarded: 0,
        }
    }

    /// The CRS of every member. Always EPSG:4326.
    pub fn crs(&self) -> Crs {
        Crs::Wgs84
    }

    /// All retained geometries, in source order.
    pub fn members(&self) -> &[Geometry<f64>] {
        &self.members
    }

    /// Number of geometries dropped while building the set.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Polygonal members in overlay form, paired with their member index.
    pub fn polygons(&self) -> Vec<(usize, MultiPolygon<f64>)> {
        self.members
            .iter()
            .enumerate()
            .filter_map(|(idx, g)| to_multi_polygon(g).map(|mp| (idx, mp)))
            .collect()
    }
}
