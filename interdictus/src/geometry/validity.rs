//! Validity and type filters applied before geometries enter an overlay.
//!
//! Invalid geometries are discarded, never repaired: a silently corrected
//! ring could hide or invent an overlap.

use geo::{Area, CoordsIter, Geometry, MultiPolygon, Validation};

/// Whether the geometry is a polygon or multipolygon.
pub fn is_polygonal(geometry: &Geometry<f64>) -> bool {
    matches!(geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
}

/// Whether every coordinate of the geometry is a finite number.
pub fn has_finite_coords(geometry: &Geometry<f64>) -> bool {
    geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
}

/// Check a geometry against the OGC validity rules.
///
/// Polygonal geometries must additionally enclose a non-zero area, which
/// rejects rings collapsed onto a line or a point.
pub fn is_valid(geometry: &Geometry<f64>) -> bool {
    if !has_finite_coords(geometry) || !geometry.is_valid() {
        return false;
    }
    if is_polygonal(geometry) {
        return geometry.unsigned_area() > 0.0;
    }
    true
}

/// Whether the geometry can take part in an area overlay.
pub fn is_valid_polygonal(geometry: &Geometry<f64>) -> bool {
    is_polygonal(geometry) && is_valid(geometry)
}

/// Convert a polygonal geometry into the multipolygon form used by the overlay.
///
/// Returns `None` for non-polygonal geometries.
pub fn to_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        _ => None,
    }
}
