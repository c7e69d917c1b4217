//! Result aggregation.
//!
//! Per-layer outcomes arrive in whatever order the workers finish. The
//! aggregator is the only place they are merged and the only place an
//! ordering is imposed, so the same inputs always produce the same report.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::labels::CanonicalLabel;
use crate::overlay::{IntersectionResult, LayerHit};

/// Overall answer of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// No restriction layer intersects the boundary.
    Clear,
    /// At least one restriction layer intersects the boundary.
    Alert,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Clear => f.write_str("CLEAR"),
            Verdict::Alert => f.write_str("ALERT"),
        }
    }
}

/// How hit labels are ordered in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelOrdering {
    /// Plain lexicographic order.
    #[default]
    Lexicographic,
    /// Lexicographic, with every public forest registry label moved after
    /// the other labels (and sorted among themselves).
    RegistryLast,
}

impl LabelOrdering {
    pub fn name(&self) -> &'static str {
        match self {
            LabelOrdering::Lexicographic => "lexicographic",
            LabelOrdering::RegistryLast => "registry_last",
        }
    }

    /// Order a set of distinct labels.
    pub fn order(&self, labels: BTreeSet<CanonicalLabel>) -> Vec<CanonicalLabel> {
        match self {
            LabelOrdering::Lexicographic => labels.into_iter().collect(),
            LabelOrdering::RegistryLast => {
                let (registry, others): (Vec<_>, Vec<_>) = labels
                    .into_iter()
                    .partition(CanonicalLabel::is_public_forest_registry);
                others.into_iter().chain(registry).collect()
            }
        }
    }
}

impl fmt::Display for LabelOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LabelOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "lexicographic" => Ok(LabelOrdering::Lexicographic),
            "registry_last" => Ok(LabelOrdering::RegistryLast),
            other => Err(format!(
                "unknown label ordering '{other}' (expected lexicographic or registry_last)"
            )),
        }
    }
}

/// Why a layer did not contribute to the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The layer could not be read from the catalog.
    LoadFailed,
    /// The layer's coordinate system cannot be transformed.
    Reprojection,
    /// The layer exceeded its time budget.
    TimedOut,
    /// Processing the layer panicked.
    Panicked,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::LoadFailed => "load failed",
            SkipReason::Reprojection => "unsupported coordinate system",
            SkipReason::TimedOut => "timed out",
            SkipReason::Panicked => "internal error",
        };
        f.write_str(text)
    }
}

/// A layer left out of the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLayer {
    pub layer_id: String,
    pub label: CanonicalLabel,
    pub reason: SkipReason,
    pub detail: String,
}

/// Result of processing one layer, produced independently by a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerOutcome {
    Clear {
        layer_id: String,
        label: CanonicalLabel,
    },
    Hit(LayerHit),
    Skipped(SkippedLayer),
}

impl LayerOutcome {
    pub fn layer_id(&self) -> &str {
        match self {
            LayerOutcome::Clear { layer_id, .. } => layer_id,
            LayerOutcome::Hit(hit) => &hit.layer,
            LayerOutcome::Skipped(skipped) => &skipped.layer_id,
        }
    }

    fn label(&self) -> &CanonicalLabel {
        match self {
            LayerOutcome::Clear { label, .. } => label,
            LayerOutcome::Hit(hit) => &hit.label,
            LayerOutcome::Skipped(skipped) => &skipped.label,
        }
    }

    fn status(&self) -> LabelStatus {
        match self {
            LayerOutcome::Clear { .. } => LabelStatus::Clear,
            LayerOutcome::Hit(_) => LabelStatus::Alert,
            LayerOutcome::Skipped(_) => LabelStatus::Skipped,
        }
    }
}

/// Status of one label in the display table.
///
/// Ordered so that the most severe status compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LabelStatus {
    Clear,
    Skipped,
    Alert,
}

impl fmt::Display for LabelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelStatus::Clear => f.write_str("CLEAR"),
            LabelStatus::Skipped => f.write_str("SKIPPED"),
            LabelStatus::Alert => f.write_str("ALERT"),
        }
    }
}

/// One row of the per-label display table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub label: CanonicalLabel,
    pub status: LabelStatus,
}

/// Final, deterministic result of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub verdict: Verdict,
    /// Distinct labels of every hit layer, ordered.
    pub labels: Vec<CanonicalLabel>,
    /// Hit layers, ordered by label then layer id.
    pub hits: Vec<LayerHit>,
    /// Layers left out of the verdict, ordered by layer id.
    pub skipped: Vec<SkippedLayer>,
    /// Number of layers that were fully evaluated.
    pub layers_checked: usize,
    /// One row per distinct label among all processed layers.
    pub table: Vec<TableRow>,
}

impl AnalysisReport {
    /// Merge per-layer outcomes into a report.
    pub fn aggregate(outcomes: Vec<LayerOutcome>, ordering: LabelOrdering) -> Self {
        let mut statuses: BTreeMap<CanonicalLabel, LabelStatus> = BTreeMap::new();
        for outcome in &outcomes {
            let status = outcome.status();
            statuses
                .entry(outcome.label().clone())
                .and_modify(|s| *s = (*s).max(status))
                .or_insert(status);
        }

        let mut hits = Vec::new();
        let mut skipped = Vec::new();
        let mut layers_checked = 0;
        for outcome in outcomes {
            match outcome {
                LayerOutcome::Clear { .. } => layers_checked += 1,
                LayerOutcome::Hit(hit) => {
                    layers_checked += 1;
                    hits.push(hit);
                }
                LayerOutcome::Skipped(s) => skipped.push(s),
            }
        }
        hits.sort_by(|a, b| (&a.label, &a.layer).cmp(&(&b.label, &b.layer)));
        skipped.sort_by(|a, b| a.layer_id.cmp(&b.layer_id));

        let hit_labels: BTreeSet<CanonicalLabel> = hits.iter().map(|h| h.label.clone()).collect();
        let labels = ordering.order(hit_labels);

        let table = ordering
            .order(statuses.keys().cloned().collect())
            .into_iter()
            .map(|label| {
                let status = statuses.get(&label).copied().unwrap_or(LabelStatus::Clear);
                TableRow { label, status }
            })
            .collect();

        let verdict = if labels.is_empty() {
            Verdict::Clear
        } else {
            Verdict::Alert
        };

        Self {
            verdict,
            labels,
            hits,
            skipped,
            layers_checked,
            table,
        }
    }

    /// Whether every listed layer contributed to the verdict.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Identifiers of the skipped layers.
    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.layer_id.as_str()).collect()
    }

    /// Flat intersection records in report order.
    pub fn results(&self) -> Vec<IntersectionResult> {
        self.hits
            .iter()
            .cloned()
            .flat_map(LayerHit::into_results)
            .collect()
    }
}
