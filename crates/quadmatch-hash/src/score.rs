//! Likelihood-ratio scoring of candidate transforms.

use nalgebra::Point2;
use quadmatch_core::{AffineTransform, SpatialIndex, SpatialIndexError};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Score of one candidate transform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Probability that a mapped point lands on a reference point.
    pub fg_probability: f64,
    /// `ln(fg_probability / bg_probability)`.
    pub ratio: f64,
}

/// Scores a transform against the null hypothesis of uniform coincidence.
///
/// Every "other" point is mapped into the reference frame and paired with
/// its nearest reference point. With a 1-unit localization accuracy,
///
/// ```text
/// fg_p  = bg_p + (1 - bg_p) * mean(exp(-d^2 / 2))
/// ratio = ln(fg_p / bg_p)
/// ```
///
/// A correct transform drives `fg_p` toward 1; a wrong one leaves it near
/// `bg_p` and the ratio near 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchScorer {
    bg_probability: f64,
}

impl MatchScorer {
    /// `bg_probability` must lie in (0, 1); see
    /// [`quadmatch_core::BackgroundDensity::resolve`].
    pub fn new(bg_probability: f64) -> Self {
        Self { bg_probability }
    }

    #[inline]
    pub fn bg_probability(&self) -> f64 {
        self.bg_probability
    }

    /// Foreground probability of `other_to_ref` applied to `other`.
    pub fn fg_probability(
        &self,
        reference: &SpatialIndex,
        other: &[Point2<f64>],
        other_to_ref: &AffineTransform,
    ) -> Result<f64, SpatialIndexError> {
        if reference.is_empty() {
            return Err(SpatialIndexError::EmptyIndex);
        }
        if other.is_empty() {
            return Ok(self.bg_probability);
        }
        let mut sum = 0.0;
        for &p in other {
            let d = reference.nearest(other_to_ref.apply(p))?.distance;
            sum += (-0.5 * d * d).exp();
        }
        let bg = self.bg_probability;
        Ok(bg + (1.0 - bg) * sum / other.len() as f64)
    }

    #[inline]
    pub fn log_ratio(&self, fg_probability: f64) -> f64 {
        (fg_probability / self.bg_probability).ln()
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(points = other.len()))
    )]
    pub fn score(
        &self,
        reference: &SpatialIndex,
        other: &[Point2<f64>],
        other_to_ref: &AffineTransform,
    ) -> Result<Score, SpatialIndexError> {
        let fg_probability = self.fg_probability(reference, other, other_to_ref)?;
        Ok(Score {
            fg_probability,
            ratio: self.log_ratio(fg_probability),
        })
    }

    /// Largest ratio any transform can reach (`fg_p == 1`).
    pub fn max_ratio(&self) -> f64 {
        self.log_ratio(1.0)
    }
}
