//! GeoPackage geometry blob and WKB codec.
//!
//! A GeoPackage geometry column stores a small binary header (magic `GP`,
//! version, flags, SRS id, optional envelope) followed by standard WKB.
//! Decoding accepts 2D, ISO Z/M/ZM and EWKB-flagged geometries; extra
//! ordinates are read and discarded.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use thiserror::Error;

const GPKG_MAGIC: &[u8; 2] = b"GP";

const FLAG_BYTE_ORDER: u8 = 0b0000_0001;
const FLAG_EMPTY: u8 = 0b0001_0000;
const FLAG_EXTENDED: u8 = 0b0010_0000;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;

/// Nesting limit for geometry collections.
const MAX_DEPTH: usize = 32;

/// Errors decoding a geometry blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WkbError {
    #[error("Geometry blob ended unexpectedly")]
    UnexpectedEof,

    #[error("Geometry blob does not start with the GeoPackage magic 'GP'")]
    BadMagic,

    #[error("Unsupported GeoPackage blob version {0}")]
    BadVersion(u8),

    #[error("Invalid GeoPackage envelope indicator {0}")]
    BadEnvelope(u8),

    #[error("Extended GeoPackage geometry types are not supported")]
    Extended,

    #[error("Invalid WKB byte order marker {0}")]
    BadByteOrder(u8),

    #[error("Unsupported WKB geometry type {0}")]
    UnsupportedType(u32),

    #[error("Expected a polygon inside a multipolygon, found WKB type {0}")]
    UnexpectedMember(u32),

    #[error("Geometry collection nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Parsed GeoPackage binary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpkgHeader {
    pub srs_id: i32,
    pub empty: bool,
    /// Length in bytes of header plus envelope; the WKB starts here.
    pub wkb_offset: usize,
}

impl GpkgHeader {
    pub fn parse(blob: &[u8]) -> Result<Self, WkbError> {
        if blob.len() < 8 {
            return Err(WkbError::UnexpectedEof);
        }
        if &blob[0..2] != GPKG_MAGIC {
            return Err(WkbError::BadMagic);
        }
        if blob[2] != 0 {
            return Err(WkbError::BadVersion(blob[2]));
        }

        let flags = blob[3];
        if flags & FLAG_EXTENDED != 0 {
            return Err(WkbError::Extended);
        }
        let envelope_code = (flags >> 1) & 0b111;
        let envelope_len = match envelope_code {
            0 => 0,
            1 => 32,
            2 | 3 => 48,
            4 => 64,
            other => return Err(WkbError::BadEnvelope(other)),
        };

        let srs_bytes = [blob[4], blob[5], blob[6], blob[7]];
        let srs_id = if flags & FLAG_BYTE_ORDER != 0 {
            i32::from_le_bytes(srs_bytes)
        } else {
            i32::from_be_bytes(srs_bytes)
        };

        let wkb_offset = 8 + envelope_len;
        if blob.len() < wkb_offset {
            return Err(WkbError::UnexpectedEof);
        }

        Ok(Self {
            srs_id,
            empty: flags & FLAG_EMPTY != 0,
            wkb_offset,
        })
    }
}

/// Decode a GeoPackage geometry blob.
///
/// Returns `Ok(None)` for blobs flagged as empty.
pub fn decode_gpkg_blob(blob: &[u8]) -> Result<Option<Geometry<f64>>, WkbError> {
    let header = GpkgHeader::parse(blob)?;
    if header.empty {
        return Ok(None);
    }
    decode_wkb(&blob[header.wkb_offset..]).map(Some)
}

/// Decode a standalone WKB geometry.
pub fn decode_wkb(bytes: &[u8]) -> Result<Geometry<f64>, WkbError> {
    let mut reader = WkbReader { bytes, pos: 0 };
    reader.geometry(0)
}

/// Encode a geometry as a GeoPackage blob (little-endian, no envelope).
pub fn encode_gpkg_blob(geometry: &Geometry<f64>, srs_id: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(GPKG_MAGIC);
    out.push(0);
    out.push(FLAG_BYTE_ORDER);
    out.extend_from_slice(&srs_id.to_le_bytes());
    write_geometry(&mut out, geometry);
    out
}

/// Geometry header: base type and ordinate count.
struct TypeCode {
    base: u32,
    dims: usize,
}

struct WkbReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl WkbReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], WkbError> {
        let end = self.pos.checked_add(N).ok_or(WkbError::UnexpectedEof)?;
        let slice = self.bytes.get(self.pos..end).ok_or(WkbError::UnexpectedEof)?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn byte_order(&mut self) -> Result<bool, WkbError> {
        match self.take::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WkbError::BadByteOrder(other)),
        }
    }

    fn u32(&mut self, le: bool) -> Result<u32, WkbError> {
        let raw = self.take::<4>()?;
        Ok(if le {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn f64(&mut self, le: bool) -> Result<f64, WkbError> {
        let raw = self.take::<8>()?;
        Ok(if le {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        })
    }

    /// Read an element count, rejecting counts the remaining bytes cannot hold.
    fn count(&mut self, le: bool, min_item_len: usize) -> Result<usize, WkbError> {
        let n = self.u32(le)? as usize;
        let remaining = self.bytes.len().saturating_sub(self.pos);
        if n.saturating_mul(min_item_len) > remaining {
            return Err(WkbError::UnexpectedEof);
        }
        Ok(n)
    }

    fn type_code(&mut self, le: bool) -> Result<TypeCode, WkbError> {
        let raw = self.u32(le)?;
        let mut dims = 2;
        if raw & EWKB_Z != 0 {
            dims += 1;
        }
        if raw & EWKB_M != 0 {
            dims += 1;
        }
        if raw & EWKB_SRID != 0 {
            self.u32(le)?;
        }

        let iso = raw & 0x0FFF_FFFF;
        let base = iso % 1000;
        dims += match iso / 1000 {
            0 => 0,
            1 | 2 => 1,
            3 => 2,
            _ => return Err(WkbError::UnsupportedType(raw)),
        };
        Ok(TypeCode { base, dims })
    }

    fn coord(&mut self, le: bool, dims: usize) -> Result<Coord<f64>, WkbError> {
        let x = self.f64(le)?;
        let y = self.f64(le)?;
        for _ in 2..dims {
            self.f64(le)?;
        }
        Ok(Coord { x, y })
    }

    fn coords(&mut self, le: bool, dims: usize) -> Result<Vec<Coord<f64>>, WkbError> {
        let n = self.count(le, dims * 8)?;
        (0..n).map(|_| self.coord(le, dims)).collect()
    }

    fn polygon_body(&mut self, le: bool, dims: usize) -> Result<Polygon<f64>, WkbError> {
        let rings = self.count(le, 4)?;
        let mut parsed = Vec::with_capacity(rings);
        for _ in 0..rings {
            parsed.push(LineString::new(self.coords(le, dims)?));
        }
        let mut iter = parsed.into_iter();
        let exterior = iter.next().unwrap_or_else(|| LineString::new(Vec::new()));
        Ok(Polygon::new(exterior, iter.collect()))
    }

    fn geometry(&mut self, depth: usize) -> Result<Geometry<f64>, WkbError> {
        if depth > MAX_DEPTH {
            return Err(WkbError::TooDeep);
        }
        let le = self.byte_order()?;
        let TypeCode { base, dims } = self.type_code(le)?;

        match base {
            WKB_POINT => Ok(Geometry::Point(Point::from(self.coord(le, dims)?))),
            WKB_LINESTRING => Ok(Geometry::LineString(LineString::new(self.coords(le, dims)?))),
            WKB_POLYGON => Ok(Geometry::Polygon(self.polygon_body(le, dims)?)),
            WKB_MULTIPOINT => {
                let n = self.count(le, 5)?;
                let mut points = Vec::with_capacity(n);
                for _ in 0..n {
                    match self.geometry(depth + 1)? {
                        Geometry::Point(p) => points.push(p),
                        _ => return Err(WkbError::UnexpectedMember(WKB_MULTIPOINT)),
                    }
                }
                Ok(Geometry::MultiPoint(MultiPoint::new(points)))
            }
            WKB_MULTILINESTRING => {
                let n = self.count(le, 5)?;
                let mut lines = Vec::with_capacity(n);
                for _ in 0..n {
                    match self.geometry(depth + 1)? {
                        Geometry::LineString(l) => lines.push(l),
                        _ => return Err(WkbError::UnexpectedMember(WKB_MULTILINESTRING)),
                    }
                }
                Ok(Geometry::MultiLineString(MultiLineString::new(lines)))
            }
            WKB_MULTIPOLYGON => {
                let n = self.count(le, 5)?;
                let mut polygons = Vec::with_capacity(n);
                for _ in 0..n {
                    match self.geometry(depth + 1)? {
                        Geometry::Polygon(p) => polygons.push(p),
                        _ => return Err(WkbError::UnexpectedMember(WKB_MULTIPOLYGON)),
                    }
                }
                Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
            }
            WKB_GEOMETRYCOLLECTION => {
                let n = self.count(le, 5)?;
                let mut members = Vec::with_capacity(n);
                for _ in 0..n {
                    members.push(self.geometry(depth + 1)?);
                }
                Ok(Geometry::GeometryCollection(GeometryCollection::new_from(
                    members,
                )))
            }
            other => Err(WkbError::UnsupportedType(other)),
        }
    }
}

fn write_header(out: &mut Vec<u8>, kind: u32) {
    out.push(1);
    out.extend_from_slice(&kind.to_le_bytes());
}

fn write_coords(out: &mut Vec<u8>, coords: &[Coord<f64>]) {
    out.extend_from_slice(&(coords.len() as u32).to_le_bytes());
    for c in coords {
        out.extend_from_slice(&c.x.to_le_bytes());
        out.extend_from_slice(&c.y.to_le_bytes());
    }
}

fn write_polygon(out: &mut Vec<u8>, polygon: &Polygon<f64>) {
    write_header(out, WKB_POLYGON);
    let rings = 1 + polygon.interiors().len();
    out.extend_from_slice(&(rings as u32).to_le_bytes());
    write_coords(out, &polygon.exterior().0);
    for ring in polygon.interiors() {
        write_coords(out, &ring.0);
    }
}

fn write_geometry(out: &mut Vec<u8>, geometry: &Geometry<f64>) {
    match geometry {
        Geometry::Point(p) => {
            write_header(out, WKB_POINT);
            out.extend_from_slice(&p.x().to_le_bytes());
            out.extend_from_slice(&p.y().to_le_bytes());
        }
        Geometry::LineString(l) => {
            write_header(out, WKB_LINESTRING);
            write_coords(out, &l.0);
        }
        Geometry::Polygon(p) => write_polygon(out, p),
        Geometry::MultiPolygon(mp) => {
            write_header(out, WKB_MULTIPOLYGON);
            out.extend_from_slice(&(mp.0.len() as u32).to_le_bytes());
            for p in &mp.0 {
                write_polygon(out, p);
            }
        }
        other => {
            let members: Vec<Geometry<f64>> = match other {
                Geometry::MultiPoint(mp) => mp.0.iter().copied().map(Geometry::Point).collect(),
                Geometry::MultiLineString(ml) => {
                    ml.0.iter().cloned().map(Geometry::LineString).collect()
                }
                Geometry::GeometryCollection(gc) => gc.0.clone(),
                Geometry::Line(l) => vec![Geometry::LineString(LineString::from(*l))],
                Geometry::Rect(r) => vec![Geometry::Polygon(r.to_polygon())],
                Geometry::Triangle(t) => vec![Geometry::Polygon(t.to_polygon())],
                _ => Vec::new(),
            };
            write_header(out, WKB_GEOMETRYCOLLECTION);
            out.extend_from_slice(&(members.len() as u32).to_le_bytes());
            for member in &members {
                write_geometry(out, member);
            }
        }
    }
}
