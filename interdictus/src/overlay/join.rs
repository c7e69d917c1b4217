//! R-tree backed spatial join between two polygon collections.

use std::ops::ControlFlow;

use geo::{BoundingRect, Intersects, MultiPolygon};
use rstar::{RTree, RTreeObject, AABB};

use super::budget::{Interrupted, LayerBudget};

/// Candidate pairs tested between budget checks.
pub const BUDGET_CHECK_INTERVAL: usize = 256;

/// Bounding box of one collection member, tagged with its index.
#[derive(Debug, Clone, Copy)]
pub struct IndexedEnvelope {
    pub idx: usize,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// Bulk-load an R-tree over the bounding boxes of `items`.
///
/// Members without a bounding box (empty multipolygons) are left out.
pub fn build_index(items: &[MultiPolygon<f64>]) -> RTree<IndexedEnvelope> {
    let envelopes = items
        .iter()
        .enumerate()
        .filter_map(|(idx, mp)| {
            let rect = mp.bounding_rect()?;
            Some(IndexedEnvelope {
                idx,
                env: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            })
        })
        .collect();
    RTree::bulk_load(envelopes)
}

/// Join `left` against `right`, calling `visit(l, r)` for every pair whose
/// geometries intersect (boundary contact included).
///
/// Pairs are visited in `(l, r)` order. `visit` may return
/// `ControlFlow::Break` to stop early. Pass a prebuilt `left_index` to reuse
/// the index of a collection joined against many others.
pub fn spatial_join<F>(
    left: &[MultiPolygon<f64>],
    left_index: Option<&RTree<IndexedEnvelope>>,
    right: &[MultiPolygon<f64>],
    budget: &LayerBudget,
    mut visit: F,
) -> Result<(), Interrupted>
where
    F: FnMut(usize, usize) -> ControlFlow<()>,
{
    if left.is_empty() || right.is_empty() {
        return Ok(());
    }
    budget.check()?;

    let built;
    let left_tree = match left_index {
        Some(tree) => tree,
        None => {
            built = build_index(left);
            &built
        }
    };
    let right_tree = build_index(right);

    let mut candidates: Vec<(usize, usize)> = left_tree
        .intersection_candidates_with_other_tree(&right_tree)
        .map(|(l, r)| (l.idx, r.idx))
        .collect();
    candidates.sort_unstable();

    for (tested, (l, r)) in candidates.into_iter().enumerate() {
        if tested % BUDGET_CHECK_INTERVAL == 0 {
            budget.check()?;
        }
        if left[l].intersects(&right[r]) && visit(l, r).is_break() {
            break;
        }
    }
    Ok(())
}
