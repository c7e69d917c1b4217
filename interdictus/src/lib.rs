//! Interdictus - restricted-zone overlay checks for land boundaries
//!
//! Given a boundary drawn by a user (KML or KMZ) and a catalog of officially
//! restricted zones (indigenous lands, conservation units, embargoed areas,
//! public forest registries, settlements), determines whether the boundary
//! overlaps any restricted zone and names the categories it hits.
//!
//! Pipeline: [`boundary`] loads the upload into a [`geometry::GeometrySet`],
//! [`analysis`] fans the [`catalog`] layers out over worker threads, each
//! worker runs the [`overlay`] engine, [`labels`] names the layers, and the
//! per-layer outcomes are merged into an [`analysis::AnalysisReport`].
//!
//! # Example
//!
//! ```
//! use geo::{polygon, Geometry};
//! use interdictus::analysis::{AnalysisConfig, Analyzer, Verdict};
//! use interdictus::catalog::MemoryCatalog;
//! use interdictus::geometry::{Crs, GeometrySet};
//! use interdictus::labels::LabelRules;
//! use tokio_util::sync::CancellationToken;
//!
//! let square = |x: f64, y: f64| Geometry::Polygon(polygon![
//!     (x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0), (x: x, y: y),
//! ]);
//! let set = GeometrySet::from_source(vec![square(0.0, 0.0)], Crs::Wgs84).unwrap();
//! let catalog = MemoryCatalog::new().with_layer("terra_indigena_xx", vec![square(0.5, 0.5)]);
//!
//! let analyzer = Analyzer::new(AnalysisConfig::default(), LabelRules::default());
//! let report = analyzer.run(&set, &catalog, &CancellationToken::new()).unwrap();
//! assert_eq!(report.verdict, Verdict::Alert);
//! assert_eq!(report.labels[0].as_str(), "Indigenous Land");
//! ```

pub mod analysis;
pub mod boundary;
pub mod catalog;
pub mod config;
pub mod geometry;
pub mod labels;
pub mod logging;
pub mod overlay;

/// Version of the interdictus library and CLI.
///
/// Defined in the workspace `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
