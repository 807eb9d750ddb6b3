//! Nearest-neighbor refinement of a quad-derived transform.

use log::debug;
use nalgebra::Point2;
use quadmatch_core::fit_affine;

use super::TransformPair;
use crate::builder::QuadSet;
use crate::score::{MatchScorer, Score};
use crate::{MatchError, RefineParams};

#[derive(Clone, Debug)]
pub(super) struct Refinement {
    pub transforms: TransformPair,
    pub score: Score,
    pub inliers: usize,
    pub rounds: usize,
}

/// Refit both directions from all nearest-neighbor pairs within
/// `inlier_radius`, round by round.
///
/// A round is kept only when its ratio is strictly higher than the best so
/// far; the first non-improving, under-constrained, or degenerate round
/// ends the loop. Returns `None` when no round improved on `start_ratio`.
pub(super) fn refine(
    reference: &QuadSet,
    other: &QuadSet,
    scorer: &MatchScorer,
    start: TransformPair,
    start_ratio: f64,
    params: &RefineParams,
) -> Result<Option<Refinement>, MatchError> {
    let mut current = start;
    let mut best_ratio = start_ratio;
    let mut improved = None;

    for round in 0..params.iterations {
        let (src, dst) = inlier_pairs(reference, other, &current, params.inlier_radius)?;
        if src.len() < 3 {
            debug!("refine round {round}: {} inliers, stopping", src.len());
            break;
        }
        let (Ok(other_to_ref), Ok(ref_to_other)) = (fit_affine(&src, &dst), fit_affine(&dst, &src))
        else {
            debug!("refine round {round}: degenerate inlier set, stopping");
            break;
        };
        let score = scorer.score(reference.index(), other.points(), &other_to_ref)?;
        if score.ratio <= best_ratio {
            debug!(
                "refine round {round}: ratio {:.3} does not improve {:.3}",
                score.ratio, best_ratio
            );
            break;
        }
        debug!(
            "refine round {round}: {} inliers, ratio {:.3} -> {:.3}",
            src.len(),
            best_ratio,
            score.ratio
        );
        best_ratio = score.ratio;
        current = TransformPair {
            other_to_ref,
            ref_to_other,
        };
        improved = Some(Refinement {
            transforms: current,
            score,
            inliers: src.len(),
            rounds: round + 1,
        });
    }
    Ok(improved)
}

type PointPairs = (Vec<Point2<f64>>, Vec<Point2<f64>>);

/// (other, reference) point pairs whose mapped residual is within `radius`.
fn inlier_pairs(
    reference: &QuadSet,
    other: &QuadSet,
    transforms: &TransformPair,
    radius: f64,
) -> Result<PointPairs, MatchError> {
    let index = reference.index();
    let mut src = Vec::new();
    let mut dst = Vec::new();
    for &p in other.points() {
        let hit = index.nearest(transforms.other_to_ref.apply(p))?;
        if hit.distance <= radius {
            src.push(p);
            dst.push(index.point(hit.index));
        }
    }
    Ok((src, dst))
}
