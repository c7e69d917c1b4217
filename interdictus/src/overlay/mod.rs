//! Intersection engine.
//!
//! Tests every member of a [`GeometrySet`] against every feature of a
//! [`RestrictionLayer`] through an R-tree join. Touching at a single point
//! or along an edge counts as intersecting. A layer is hit when at least
//! one pair intersects.

mod budget;
mod join;

pub use budget::{Interrupted, LayerBudget};
pub use join::{build_index, spatial_join, IndexedEnvelope, BUDGET_CHECK_INTERVAL};

use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;

use geo::{Area, BooleanOps, MultiPolygon};
use rstar::RTree;
use serde::Serialize;

use crate::catalog::RestrictionLayer;
use crate::geometry::GeometrySet;
use crate::labels::{CanonicalLabel, LabelRules};

/// Granularity of intersection records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// One record per hit layer; the join stops at the first intersecting pair.
    #[default]
    Layer,
    /// One record per intersecting (member, feature) pair, with overlap geometry.
    Feature,
}

impl ReportMode {
    pub fn name(&self) -> &'static str {
        match self {
            ReportMode::Layer => "layer",
            ReportMode::Feature => "feature",
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "layer" => Ok(ReportMode::Layer),
            "feature" => Ok(ReportMode::Feature),
            other => Err(format!("unknown report mode '{other}' (expected layer or feature)")),
        }
    }
}

/// One intersecting (member, feature) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatch {
    /// Index of the member in the [`GeometrySet`].
    pub member: usize,
    /// Index of the feature in the loaded layer.
    pub feature: usize,
    /// Shared area, empty when the pair only touches along its boundary.
    #[serde(skip)]
    pub overlap: MultiPolygon<f64>,
    /// Area of `overlap` in square degrees.
    pub overlap_area: f64,
}

/// A layer with at least one intersecting pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerHit {
    pub layer: String,
    pub label: CanonicalLabel,
    /// Empty in [`ReportMode::Layer`].
    pub matches: Vec<FeatureMatch>,
}

impl LayerHit {
    /// Flatten into intersection records.
    pub fn into_results(self) -> Vec<IntersectionResult> {
        if self.matches.is_empty() {
            return vec![IntersectionResult {
                layer: self.layer,
                label: self.label,
                detail: None,
            }];
        }
        let LayerHit {
            layer,
            label,
            matches,
        } = self;
        matches
            .into_iter()
            .map(|m| IntersectionResult {
                layer: layer.clone(),
                label: label.clone(),
                detail: Some(m),
            })
            .collect()
    }
}

/// One intersection record: a hit layer, or one hit pair in feature mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntersectionResult {
    pub layer: String,
    pub label: CanonicalLabel,
    pub detail: Option<FeatureMatch>,
}

/// A [`GeometrySet`] in overlay form with its R-tree, built once per run.
pub struct PreparedSet {
    polygons: Vec<MultiPolygon<f64>>,
    members: Vec<usize>,
    index: RTree<IndexedEnvelope>,
}

impl PreparedSet {
    pub fn new(set: &GeometrySet) -> Self {
        let (members, polygons): (Vec<usize>, Vec<MultiPolygon<f64>>) =
            set.polygons().into_iter().unzip();
        let index = build_index(&polygons);
        Self {
            polygons,
            members,
            index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }
}

/// Overlay one layer against a prepared set.
///
/// Returns `Ok(None)` when nothing intersects, including when either side
/// is empty.
pub fn intersect_layer(
    set: &PreparedSet,
    layer: &RestrictionLayer,
    label: &CanonicalLabel,
    mode: ReportMode,
    budget: &LayerBudget,
) -> Result<Option<LayerHit>, Interrupted> {
    if set.is_empty() || layer.is_empty() {
        return Ok(None);
    }

    let features = layer.features();
    let mut hit = false;
    let mut matches = Vec::new();

    spatial_join(
        &set.polygons,
        Some(&set.index),
        features,
        budget,
        |l, r| {
            hit = true;
            match mode {
                ReportMode::Layer => ControlFlow::Break(()),
                ReportMode::Feature => {
                    let overlap = set.polygons[l].intersection(&features[r]);
                    let overlap_area = overlap.unsigned_area();
                    matches.push(FeatureMatch {
                        member: set.members[l],
                        feature: r,
                        overlap,
                        overlap_area,
                    });
                    ControlFlow::Continue(())
                }
            }
        },
    )?;

    if !hit {
        return Ok(None);
    }
    tracing::debug!(
        layer = %layer.id(),
        label = %label,
        pairs = matches.len(),
        "Layer intersects boundary"
    );
    Ok(Some(LayerHit {
        layer: layer.id().to_string(),
        label: label.clone(),
        matches,
    }))
}

/// Sequential overlay of `set` against every layer, without time limits.
///
/// Results follow layer order, then pair order within a layer.
pub fn intersect<'a>(
    set: &GeometrySet,
    layers: impl IntoIterator<Item = &'a RestrictionLayer>,
    rules: &LabelRules,
    mode: ReportMode,
) -> Vec<IntersectionResult> {
    let prepared = PreparedSet::new(set);
    let budget = LayerBudget::unlimited();
    let mut results = Vec::new();
    for layer in layers {
        let label = rules.normalize(layer.id());
        // An unlimited budget cannot interrupt.
        if let Ok(Some(hit)) = intersect_layer(&prepared, layer, &label, mode, &budget) {
            results.extend(hit.into_results());
        }
    }
    results
}
