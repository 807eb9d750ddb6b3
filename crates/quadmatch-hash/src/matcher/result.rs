use quadmatch_core::AffineTransform;
use serde::{Deserialize, Serialize};

use crate::AcceptanceParams;

/// Both directions of a recovered alignment.
///
/// The two maps are independent least-squares fits of the same
/// correspondences, so they are close to, but not exactly, inverses.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformPair {
    /// Maps "other" coordinates into the reference frame. This is the
    /// direction that was scored.
    pub other_to_ref: AffineTransform,
    pub ref_to_other: AffineTransform,
}

/// The winning quad pair and its transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestMatch {
    pub transforms: TransformPair,
    pub fg_probability: f64,
    /// Reference point indices of the matched quad (A, B, C, D).
    pub ref_quad: [usize; 4],
    /// Other point indices of the matched quad (A, B, C, D).
    pub other_quad: [usize; 4],
    /// Inlier pairs used by the last accepted refinement round.
    pub refined_inliers: Option<usize>,
}

/// Counters collected during one matching call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub ref_quads: usize,
    pub other_quads: usize,
    pub comparisons: usize,
    /// Quad pairs whose codes matched within tolerance.
    pub matches: usize,
    /// Matched pairs skipped because their points were collinear.
    pub degenerate: usize,
    /// Refinement rounds that improved the ratio.
    pub refine_rounds: usize,
    /// The search stopped early on timeout or abort.
    pub timed_out: bool,
}

/// Result of [`crate::Matcher::find_transform`].
///
/// `best_ratio == 0.0` with `best == None` means no quad pair matched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub best_ratio: f64,
    pub best: Option<BestMatch>,
    pub stats: SearchStats,
}

impl MatchOutcome {
    pub fn best_transform(&self) -> Option<&TransformPair> {
        self.best.as_ref().map(|b| &b.transforms)
    }

    pub fn is_accepted(&self, acceptance: &AcceptanceParams) -> bool {
        self.best.is_some() && self.best_ratio > acceptance.min_ratio
    }

    /// The transform pair, only when the ratio clears the threshold.
    ///
    /// A low-ratio transform is still available through
    /// [`Self::best_transform`] for inspection.
    pub fn accepted(&self, acceptance: &AcceptanceParams) -> Option<&TransformPair> {
        if self.is_accepted(acceptance) {
            self.best_transform()
        } else {
            None
        }
    }
}
