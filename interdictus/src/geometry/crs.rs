//! Coordinate reference systems and reprojection to EPSG:4326.
//!
//! Only the systems that restriction datasets actually ship in are handled:
//! geographic WGS84 / SIRGAS 2000, Web Mercator and the UTM zones (WGS84 and
//! SIRGAS 2000 south). Anything else is reported as unsupported so the caller
//! can skip the affected layer instead of guessing.

use std::f64::consts::PI;
use std::fmt;

use geo::{Coord, Geometry, MapCoords};
use thiserror::Error;

/// EPSG code of the canonical CRS used throughout the crate.
pub const CANONICAL_EPSG: i32 = 4326;

/// Sphere radius used by Web Mercator (EPSG:3857).
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// UTM central scale factor.
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Errors raised while moving coordinates into EPSG:4326.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReprojectionError {
    /// The source CRS has no transformation available.
    #[error("Unsupported coordinate reference system: EPSG:{0}")]
    UnsupportedCrs(i32),

    /// A transformed coordinate left the valid lon/lat domain.
    #[error("Coordinate ({x}, {y}) is outside the geographic domain after reprojection")]
    OutOfRange { x: f64, y: f64 },
}

/// Geodetic datum of a projected system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datum {
    /// WGS84 ellipsoid.
    Wgs84,
    /// SIRGAS 2000 (GRS80 ellipsoid).
    Sirgas2000,
}

impl Datum {
    /// Semi-major axis and flattening of the datum ellipsoid.
    fn ellipsoid(self) -> (f64, f64) {
        match self {
            Datum::Wgs84 => (6_378_137.0, 1.0 / 298.257_223_563),
            Datum::Sirgas2000 => (6_378_137.0, 1.0 / 298.257_222_101),
        }
    }
}

/// A coordinate reference system identified by its EPSG code.
///
/// # Examples
///
/// ```
/// use interdictus::geometry::Crs;
///
/// assert_eq!(Crs::from_epsg(4326), Crs::Wgs84);
/// assert_eq!(Crs::from_epsg(31983).epsg(), 31983);
/// assert!(!Crs::from_epsg(4618).is_supported());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Crs {
    /// EPSG:4326, geographic WGS84.
    #[default]
    Wgs84,
    /// EPSG:4674, geographic SIRGAS 2000 (coincident with WGS84 at this precision).
    Sirgas2000,
    /// EPSG:3857, spherical Web Mercator.
    WebMercator,
    /// Universal Transverse Mercator zone.
    Utm { zone: u8, south: bool, datum: Datum },
    /// Any other EPSG code.
    Other(i32),
}

impl Crs {
    /// Map an EPSG code to a known CRS.
    pub fn from_epsg(code: i32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            4674 => Crs::Sirgas2000,
            3857 | 900913 => Crs::WebMercator,
            32601..=32660 => Crs::Utm {
                zone: (code - 32600) as u8,
                south: false,
                datum: Datum::Wgs84,
            },
            32701..=32760 => Crs::Utm {
                zone: (code - 32700) as u8,
                south: true,
                datum: Datum::Wgs84,
            },
            31978..=31985 => Crs::Utm {
                zone: (code - 31960) as u8,
                south: true,
                datum: Datum::Sirgas2000,
            },
            other => Crs::Other(other),
        }
    }

    /// Recognise a CRS from WKT text, as found in a shapefile `.prj`.
    ///
    /// An explicit EPSG authority on the outermost definition wins. Without
    /// one the definition name is matched against the geographic, Web
    /// Mercator and UTM systems listed above (ESRI and OGC spellings).
    /// Unrecognised text maps to `Crs::Other(0)`.
    pub fn from_wkt(wkt: &str) -> Self {
        if let Some(code) = last_epsg_authority(wkt) {
            return Crs::from_epsg(code);
        }

        let name = wkt.to_ascii_uppercase().replace([' ', '-'], "_");
        if name.trim_start().starts_with("PROJCS") {
            if name.contains("WEB_MERCATOR") || name.contains("PSEUDO_MERCATOR") {
                return Crs::WebMercator;
            }
            let Some((zone, south)) = utm_zone(&name) else {
                return Crs::Other(0);
            };
            let code = if name.contains("SIRGAS") {
                if !south {
                    return Crs::Other(0);
                }
                31960 + zone as i32
            } else if name.contains("WGS_84") || name.contains("WGS_1984") || name.contains("WGS84") {
                if south {
                    32700 + zone as i32
                } else {
                    32600 + zone as i32
                }
            } else {
                return Crs::Other(0);
            };
            return Crs::from_epsg(code);
        }

        if name.contains("SIRGAS") {
            Crs::Sirgas2000
        } else if name.contains("WGS_84") || name.contains("WGS_1984") || name.contains("WGS84") {
            Crs::Wgs84
        } else {
            Crs::Other(0)
        }
    }

    /// EPSG code of this CRS.
    pub fn epsg(&self) -> i32 {
        match *self {
            Crs::Wgs84 => 4326,
            Crs::Sirgas2000 => 4674,
            Crs::WebMercator => 3857,
            Crs::Utm {
                zone,
                south,
                datum: Datum::Wgs84,
            } => {
                if south {
                    32700 + zone as i32
                } else {
                    32600 + zone as i32
                }
            }
            Crs::Utm {
                zone,
                datum: Datum::Sirgas2000,
                ..
            } => 31960 + zone as i32,
            Crs::Other(code) => code,
        }
    }

    /// Whether a transformation to EPSG:4326 is available.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Crs::Other(_))
    }

    /// Whether coordinates are already longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84 | Crs::Sirgas2000)
    }

    /// Transform a single coordinate into EPSG:4326 (x = lon, y = lat).
    pub fn to_wgs84(&self, coord: Coord<f64>) -> Result<Coord<f64>, ReprojectionError> {
        let out = match *self {
            Crs::Wgs84 | Crs::Sirgas2000 => coord,
            Crs::WebMercator => web_mercator_inverse(coord),
            Crs::Utm { zone, south, datum } => utm_inverse(coord, zone, south, datum),
            Crs::Other(code) => return Err(ReprojectionError::UnsupportedCrs(code)),
        };

        if !out.x.is_finite()
            || !out.y.is_finite()
            || !(-180.0..=180.0).contains(&out.x)
            || !(-90.0..=90.0).contains(&out.y)
        {
            return Err(ReprojectionError::OutOfRange {
                x: coord.x,
                y: coord.y,
            });
        }
        Ok(out)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Code of the last `AUTHORITY["EPSG","<code>"]` in a WKT string.
///
/// WKT closes the outermost definition last, so the final authority belongs
/// to it.
fn last_epsg_authority(wkt: &str) -> Option<i32> {
    let upper = wkt.to_ascii_uppercase();
    let start = upper.rfind("AUTHORITY[")? + "AUTHORITY[".len();
    let body = &upper[start..upper[start..].find(']')? + start];
    let mut parts = body.split(',').map(|p| p.trim().trim_matches('"'));
    if parts.next()? != "EPSG" {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Zone number and hemisphere from a normalised `..._UTM_ZONE_23S...` name.
fn utm_zone(name: &str) -> Option<(u8, bool)> {
    let rest = &name[name.find("UTM_ZONE_")? + "UTM_ZONE_".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let zone: u8 = digits.parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }
    match rest[digits.len()..].chars().next()? {
        'S' => Some((zone, true)),
        'N' => Some((zone, false)),
        _ => None,
    }
}

/// Reproject a geometry from `from` into EPSG:4326.
///
/// Geographic sources are returned as-is after a domain check.
pub fn reproject(geometry: &Geometry<f64>, from: Crs) -> Result<Geometry<f64>, ReprojectionError> {
    if let Crs::Other(code) = from {
        return Err(ReprojectionError::UnsupportedCrs(code));
    }
    geometry.try_map_coords(move |coord| from.to_wgs84(coord))
}

/// Inverse spherical mercator.
fn web_mercator_inverse(coord: Coord<f64>) -> Coord<f64> {
    let lon = coord.x / WEB_MERCATOR_RADIUS * 180.0 / PI;
    let lat = (2.0 * (coord.y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0) * 180.0 / PI;
    Coord { x: lon, y: lat }
}

/// Inverse transverse mercator (Snyder, USGS PP 1395, eq. 8-18 to 8-25).
fn utm_inverse(coord: Coord<f64>, zone: u8, south: bool, datum: Datum) -> Coord<f64> {
    let (a, f) = datum.ellipsoid();
    let e2 = f * (2.0 - f);
    let ep2 = e2 / (1.0 - e2);

    let x = coord.x - UTM_FALSE_EASTING;
    let y = if south {
        coord.y - UTM_FALSE_NORTHING_SOUTH
    } else {
        coord.y
    };

    let m = y / UTM_K0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));

    let sqrt_1_e2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let n1 = a / (1.0 - e2 * sin_phi1 * sin_phi1).sqrt();
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi1 * sin_phi1).powf(1.5);
    let d = x / (n1 * UTM_K0);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lon0 = (zone as f64 * 6.0 - 183.0).to_radians();
    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    Coord {
        x: lon.to_degrees(),
        y: lat.to_degrees(),
    }
}
