//! KML feature-tree parser.
//!
//! KML nests `Document` and `Folder` containers to arbitrary depth; only
//! `Placemark` leaves carry geometry. The parser builds a [`KmlDocument`]
//! tree from a streaming XML reader, and [`KmlDocument::geometries`] walks it
//! with an explicit stack. Nesting is capped at [`MAX_FEATURE_DEPTH`] so the
//! tree's own drop and comparison glue stay within the call stack.

use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::LoadError;

/// Deepest allowed nesting of `Document`/`Folder`/`Placemark` elements.
pub const MAX_FEATURE_DEPTH: usize = 1_000;

/// Geometry as written in the markup, before conversion to `geo` types.
#[derive(Debug, Clone, PartialEq)]
pub enum KmlGeometry {
    Point(Coord<f64>),
    LineString(Vec<Coord<f64>>),
    LinearRing(Vec<Coord<f64>>),
    Polygon {
        outer: Vec<Coord<f64>>,
        inner: Vec<Vec<Coord<f64>>>,
    },
    Multi(Vec<KmlGeometry>),
}

impl KmlGeometry {
    /// Convert into `geo` geometries.
    ///
    /// A `MultiGeometry` made only of polygons becomes one multipolygon;
    /// mixed collections contribute each leaf separately.
    pub fn to_geometries(&self) -> Vec<Geometry<f64>> {
        match self {
            KmlGeometry::Multi(children) => {
                let mut leaves = Vec::new();
                for child in children {
                    leaves.extend(child.to_geometries());
                }
                if !leaves.is_empty() && leaves.iter().all(|g| matches!(g, Geometry::Polygon(_)))
                {
                    let polygons = leaves
                        .into_iter()
                        .filter_map(|g| match g {
                            Geometry::Polygon(p) => Some(p),
                            _ => None,
                        })
                        .collect();
                    vec![Geometry::MultiPolygon(MultiPolygon::new(polygons))]
                } else {
                    leaves
                }
            }
            KmlGeometry::Point(c) => vec![Geometry::Point(Point::from(*c))],
            KmlGeometry::LineString(coords) | KmlGeometry::LinearRing(coords) => {
                vec![Geometry::LineString(LineString::new(coords.clone()))]
            }
            KmlGeometry::Polygon { outer, inner } => {
                let holes = inner
                    .iter()
                    .map(|ring| LineString::new(ring.clone()))
                    .collect();
                vec![Geometry::Polygon(Polygon::new(
                    LineString::new(outer.clone()),
                    holes,
                ))]
            }
        }
    }
}

/// A node of the KML feature tree.
#[derive(Debug, Clone, PartialEq)]
pub enum KmlFeature {
    /// `Document` or `Folder`: holds nested features, no geometry of its own.
    Container {
        name: Option<String>,
        children: Vec<KmlFeature>,
    },
    /// `Placemark`: a leaf that may expose a geometry.
    Placemark {
        name: Option<String>,
        geometry: Option<KmlGeometry>,
    },
}

impl KmlFeature {
    /// Nested features, if this node is a container.
    pub fn children(&self) -> Option<&[KmlFeature]> {
        match self {
            KmlFeature::Container { children, .. } => Some(children),
            KmlFeature::Placemark { .. } => None,
        }
    }

    /// Geometry exposed by this node, if it is a leaf that has one.
    pub fn geometry(&self) -> Option<&KmlGeometry> {
        match self {
            KmlFeature::Placemark { geometry, .. } => geometry.as_ref(),
            KmlFeature::Container { .. } => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            KmlFeature::Container { name, .. } | KmlFeature::Placemark { name, .. } => {
                name.as_deref()
            }
        }
    }
}

/// A parsed KML document: the top-level features below `<kml>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmlDocument {
    pub features: Vec<KmlFeature>,
}

impl KmlDocument {
    /// Parse KML markup.
    pub fn parse(text: &str) -> Result<Self, LoadError> {
        TreeBuilder::default().run(text)
    }

    /// Collect the geometry of every leaf in document order.
    pub fn geometries(&self) -> Vec<Geometry<f64>> {
        let mut out = Vec::new();
        let mut stack: Vec<&KmlFeature> = self.features.iter().rev().collect();

        while let Some(feature) = stack.pop() {
            if let Some(children) = feature.children() {
                stack.extend(children.iter().rev());
            } else if let Some(geometry) = feature.geometry() {
                out.extend(geometry.to_geometries());
            }
        }
        out
    }

    /// Number of `Placemark` leaves, with or without geometry.
    pub fn placemark_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&KmlFeature> = self.features.iter().collect();
        while let Some(feature) = stack.pop() {
            match feature.children() {
                Some(children) => stack.extend(children.iter()),
                None => count += 1,
            }
        }
        count
    }
}

/// Which boundary of a polygon the next ring belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Outer,
    Inner,
}

/// Geometry under construction.
#[derive(Debug)]
enum GeomBuilder {
    Point(Option<Coord<f64>>),
    LineString(Option<Vec<Coord<f64>>>),
    LinearRing(Option<Vec<Coord<f64>>>),
    Polygon {
        outer: Option<Vec<Coord<f64>>>,
        inner: Vec<Vec<Coord<f64>>>,
        boundary: Option<Boundary>,
    },
    Multi(Vec<KmlGeometry>),
}

impl GeomBuilder {
    fn for_tag(tag: &str) -> Option<Self> {
        match tag {
            "Point" => Some(GeomBuilder::Point(None)),
            "LineString" => Some(GeomBuilder::LineString(None)),
            "LinearRing" => Some(GeomBuilder::LinearRing(None)),
            "Polygon" => Some(GeomBuilder::Polygon {
                outer: None,
                inner: Vec::new(),
                boundary: None,
            }),
            "MultiGeometry" => Some(GeomBuilder::Multi(Vec::new())),
            _ => None,
        }
    }

    fn set_coordinates(&mut self, coords: Vec<Coord<f64>>) {
        match self {
            GeomBuilder::Point(slot) => *slot = coords.first().copied(),
            GeomBuilder::LineString(slot) | GeomBuilder::LinearRing(slot) => *slot = Some(coords),
            GeomBuilder::Polygon { .. } | GeomBuilder::Multi(_) => {}
        }
    }

    fn finish(self) -> Option<KmlGeometry> {
        match self {
            GeomBuilder::Point(c) => c.map(KmlGeometry::Point),
            GeomBuilder::LineString(c) => c.filter(|c| c.len() >= 2).map(KmlGeometry::LineString),
            GeomBuilder::LinearRing(c) => c.filter(|c| c.len() >= 3).map(KmlGeometry::LinearRing),
            GeomBuilder::Polygon { outer, inner, .. } => outer
                .filter(|ring| ring.len() >= 3)
                .map(|outer| KmlGeometry::Polygon { outer, inner }),
            GeomBuilder::Multi(children) => {
                if children.is_empty() {
                    None
                } else {
                    Some(KmlGeometry::Multi(children))
                }
            }
        }
    }
}

/// Feature frame on the builder stack.
#[derive(Debug)]
enum Frame {
    Container {
        name: Option<String>,
        children: Vec<KmlFeature>,
    },
    Placemark {
        name: Option<String>,
        geometry: Option<KmlGeometry>,
    },
}

#[derive(Debug, Default)]
struct TreeBuilder {
    /// Local names of the currently open elements.
    path: Vec<String>,
    frames: Vec<Frame>,
    geoms: Vec<GeomBuilder>,
    text: String,
}

impl TreeBuilder {
    fn run(mut self, text: &str) -> Result<KmlDocument, LoadError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        self.frames.push(Frame::Container {
            name: None,
            children: Vec::new(),
        });
        let mut saw_root = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    saw_root = true;
                    self.open(&e)?;
                }
                Ok(Event::Empty(e)) => {
                    saw_root = true;
                    self.open(&e)?;
                    self.close()?;
                }
                Ok(Event::End(_)) => self.close()?,
                Ok(Event::Text(t)) => {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| LoadError::Markup(e.to_string()))?;
                    self.text.push_str(&unescaped);
                }
                Ok(Event::CData(c)) => {
                    let raw = std::str::from_utf8(&c)?;
                    self.text.push_str(raw);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(LoadError::Markup(format!(
                        "{} at byte {}",
                        e,
                        reader.error_position()
                    )))
                }
            }
        }

        if !saw_root {
            return Err(LoadError::Markup("document has no root element".to_string()));
        }
        if !self.path.is_empty() {
            return Err(LoadError::Markup(format!(
                "unexpected end of document inside <{}>",
                self.path.join("/")
            )));
        }

        match self.frames.pop() {
            Some(Frame::Container { children, .. }) if self.frames.is_empty() => {
                Ok(KmlDocument { features: children })
            }
            _ => Err(LoadError::Markup("unbalanced feature tree".to_string())),
        }
    }

    fn open(&mut self, start: &BytesStart<'_>) -> Result<(), LoadError> {
        let tag = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        self.text.clear();

        // frames[0] is the implicit document root.
        if matches!(tag.as_str(), "Document" | "Folder" | "Placemark")
            && self.frames.len() > MAX_FEATURE_DEPTH
        {
            return Err(LoadError::Markup(format!(
                "features nested deeper than {} levels",
                MAX_FEATURE_DEPTH
            )));
        }

        match tag.as_str() {
            "Document" | "Folder" => self.frames.push(Frame::Container {
                name: None,
                children: Vec::new(),
            }),
            "Placemark" => self.frames.push(Frame::Placemark {
                name: None,
                geometry: None,
            }),
            "outerBoundaryIs" | "innerBoundaryIs" => {
                let side = if tag == "outerBoundaryIs" {
                    Boundary::Outer
                } else {
                    Boundary::Inner
                };
                if let Some(GeomBuilder::Polygon { boundary, .. }) = self.geoms.last_mut() {
                    *boundary = Some(side);
                }
            }
            other => {
                if let Some(builder) = GeomBuilder::for_tag(other) {
                    self.geoms.push(builder);
                }
            }
        }
        self.path.push(tag);
        Ok(())
    }

    fn close(&mut self) -> Result<(), LoadError> {
        let tag = self
            .path
            .pop()
            .ok_or_else(|| LoadError::Markup("closing tag without opening tag".to_string()))?;
        let text = std::mem::take(&mut self.text);

        match tag.as_str() {
            "Document" | "Folder" => {
                if let Some(Frame::Container { name, children }) = self.pop_feature_frame() {
                    self.attach(KmlFeature::Container { name, children });
                }
            }
            "Placemark" => {
                if let Some(Frame::Placemark { name, geometry }) = self.pop_feature_frame() {
                    self.attach(KmlFeature::Placemark { name, geometry });
                }
            }
            "name" => self.set_name(text),
            "coordinates" => {
                if let Some(builder) = self.geoms.last_mut() {
                    match parse_coordinates(&text) {
                        Some(coords) => builder.set_coordinates(coords),
                        None => tracing::debug!("Ignoring malformed KML coordinates"),
                    }
                }
            }
            "outerBoundaryIs" | "innerBoundaryIs" => {
                if let Some(GeomBuilder::Polygon { boundary, .. }) = self.geoms.last_mut() {
                    *boundary = None;
                }
            }
            other if GeomBuilder::for_tag(other).is_some() => {
                if let Some(builder) = self.geoms.pop() {
                    self.finish_geometry(builder);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn pop_feature_frame(&mut self) -> Option<Frame> {
        // The root frame is never popped by a closing tag.
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Attach a finished feature to the nearest enclosing container.
    fn attach(&mut self, feature: KmlFeature) {
        for frame in self.frames.iter_mut().rev() {
            if let Frame::Container { children, .. } = frame {
                children.push(feature);
                return;
            }
        }
    }

    fn set_name(&mut self, text: String) {
        let parent = self.path.last().map(String::as_str);
        if !matches!(parent, Some("Document" | "Folder" | "Placemark")) {
            return;
        }
        if let Some(Frame::Container { name, .. } | Frame::Placemark { name, .. }) =
            self.frames.last_mut()
        {
            if name.is_none() && !text.is_empty() {
                *name = Some(text);
            }
        }
    }

    fn finish_geometry(&mut self, builder: GeomBuilder) {
        let is_ring = matches!(builder, GeomBuilder::LinearRing(_));
        let Some(geometry) = builder.finish() else {
            return;
        };

        match self.geoms.last_mut() {
            Some(GeomBuilder::Polygon {
                outer,
                inner,
                boundary,
            }) if is_ring => {
                if let KmlGeometry::LinearRing(ring) = geometry {
                    match boundary {
                        Some(Boundary::Inner) => inner.push(ring),
                        _ => {
                            if outer.is_none() {
                                *outer = Some(ring);
                            }
                        }
                    }
                }
            }
            Some(GeomBuilder::Multi(children)) => children.push(geometry),
            Some(_) => {}
            None => {
                if let Some(Frame::Placemark { geometry: slot, .. }) = self.frames.last_mut() {
                    if slot.is_none() {
                        *slot = Some(geometry);
                    }
                }
            }
        }
    }
}

/// Parse a KML `<coordinates>` body: whitespace-separated `lon,lat[,alt]` tuples.
///
/// Returns `None` when the body is empty or any tuple is malformed.
pub fn parse_coordinates(text: &str) -> Option<Vec<Coord<f64>>> {
    let mut coords = Vec::new();
    for tuple in text.split_whitespace() {
        let mut parts = tuple.split(',');
        let x: f64 = parts.next()?.trim().parse().ok()?;
        let y: f64 = parts.next()?.trim().parse().ok()?;
        coords.push(Coord { x, y });
    }
    if coords.is_empty() {
        None
    } else {
        Some(coords)
    }
}
