//! Reference-set matcher: quad search, scoring and refinement.

mod refine;
mod result;
mod search;

pub use result::{BestMatch, MatchOutcome, SearchStats, TransformPair};

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use log::{debug, info};
use nalgebra::Point2;
use quadmatch_core::BackgroundDensity;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::builder::QuadSet;
use crate::score::MatchScorer;
use crate::{MatchError, QuadParams, SearchParams};

use search::SearchContext;

/// Matcher bound to one reference point set.
///
/// Reference quads and the spatial index are built once in [`Matcher::new`]
/// and are read-only afterwards, so a single matcher can serve concurrent
/// [`Matcher::find_transform`] calls.
#[derive(Debug)]
pub struct Matcher {
    reference: QuadSet,
    scorer: MatchScorer,
}

impl Matcher {
    /// Build reference quads and resolve the background probability.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(points), fields(points = points.len()))
    )]
    pub fn new(
        points: Vec<Point2<f64>>,
        params: QuadParams,
        density: BackgroundDensity,
    ) -> Result<Self, MatchError> {
        let reference = QuadSet::build(points, &params)?;
        let bg_probability = density.resolve(reference.points())?;
        info!(
            "reference: {} points, {} quads, bg_p={:.3e}",
            reference.points().len(),
            reference.quads().len(),
            bg_probability
        );
        Ok(Self {
            reference,
            scorer: MatchScorer::new(bg_probability),
        })
    }

    pub fn reference(&self) -> &QuadSet {
        &self.reference
    }

    pub fn bg_probability(&self) -> f64 {
        self.scorer.bg_probability()
    }

    /// Build quads for an "other" set with the bounds `params` selects.
    pub fn prepare_other(
        &self,
        points: Vec<Point2<f64>>,
        params: &SearchParams,
    ) -> Result<QuadSet, MatchError> {
        let quad_params = params.quads.as_ref().unwrap_or(self.reference.params());
        let other = QuadSet::build(points, quad_params)?;
        debug!(
            "other: {} points, {} quads",
            other.points().len(),
            other.quads().len()
        );
        Ok(other)
    }

    /// Find the affine transform that best aligns `other` with the reference.
    ///
    /// Parameters are validated before any quad is built. Finding no match is
    /// not an error: the outcome then has `best_ratio == 0.0` and no best.
    pub fn find_transform(
        &self,
        other: Vec<Point2<f64>>,
        params: &SearchParams,
    ) -> Result<MatchOutcome, MatchError> {
        params.validate()?;
        let other = self.prepare_other(other, params)?;
        self.match_quad_set(&other, params, None)
    }

    /// Like [`Self::find_transform`], stopping between quad rows once
    /// `abort` is set. The best match found so far is returned.
    pub fn find_transform_with_abort(
        &self,
        other: Vec<Point2<f64>>,
        params: &SearchParams,
        abort: &AtomicBool,
    ) -> Result<MatchOutcome, MatchError> {
        params.validate()?;
        let other = self.prepare_other(other, params)?;
        self.match_quad_set(&other, params, Some(abort))
    }

    /// Search an already prepared "other" set. `params.quads` is ignored.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(ref_quads = self.reference.quads().len(), other_quads = other.quads().len())
        )
    )]
    pub fn match_quad_set(
        &self,
        other: &QuadSet,
        params: &SearchParams,
        abort: Option<&AtomicBool>,
    ) -> Result<MatchOutcome, MatchError> {
        params.validate()?;
        let started = Instant::now();
        let ctx = SearchContext {
            reference: &self.reference,
            other,
            scorer: &self.scorer,
            tolerance: params.tolerance,
            deadline: params
                .timeout_ms
                .map(|ms| started + Duration::from_millis(ms)),
            abort,
        };
        let found = ctx.run()?;

        let mut stats = SearchStats {
            ref_quads: self.reference.quads().len(),
            other_quads: other.quads().len(),
            comparisons: found.comparisons,
            matches: found.matches,
            degenerate: found.degenerate,
            refine_rounds: 0,
            timed_out: found.skipped_rows > 0,
        };

        let Some(candidate) = found.best else {
            info!(
                "no match: {} code matches ({} degenerate) in {:.1} ms",
                stats.matches,
                stats.degenerate,
                started.elapsed().as_secs_f64() * 1e3
            );
            return Ok(MatchOutcome {
                best_ratio: 0.0,
                best: None,
                stats,
            });
        };
        debug!(
            "best quad pair {:?} / {:?}: ratio {:.3}",
            candidate.ref_quad, candidate.other_quad, candidate.ratio
        );

        let mut best = BestMatch {
            transforms: candidate.transforms,
            fg_probability: candidate.fg_probability,
            ref_quad: candidate.ref_quad,
            other_quad: candidate.other_quad,
            refined_inliers: None,
        };
        let mut best_ratio = candidate.ratio;

        if params.refine.enabled {
            if let Some(r) = refine::refine(
                &self.reference,
                other,
                &self.scorer,
                best.transforms,
                best_ratio,
                &params.refine,
            )? {
                best.transforms = r.transforms;
                best.fg_probability = r.score.fg_probability;
                best.refined_inliers = Some(r.inliers);
                best_ratio = r.score.ratio;
                stats.refine_rounds = r.rounds;
            }
        }

        info!(
            "best ratio {:.3} from {} code matches ({} degenerate, {} refine rounds) in {:.1} ms",
            best_ratio,
            stats.matches,
            stats.degenerate,
            stats.refine_rounds,
            started.elapsed().as_secs_f64() * 1e3
        );
        Ok(MatchOutcome {
            best_ratio,
            best: Some(best),
            stats,
        })
    }
}
