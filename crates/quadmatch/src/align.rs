use log::debug;
use nalgebra::Point2;
use quadmatch_core::BackgroundDensity;
use quadmatch_hash::{
    AcceptanceParams, MatchError, MatchOutcome, Matcher, QuadParams, SearchParams, TransformPair,
};

/// All knobs for a one-shot [`align_with`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlignParams {
    pub quads: QuadParams,
    pub density: BackgroundDensity,
    pub search: SearchParams,
    pub acceptance: AcceptanceParams,
}

/// Register `other` onto `reference` with default parameters.
///
/// Returns `Ok(None)` when no transform clears the acceptance threshold.
pub fn align(
    reference: Vec<Point2<f64>>,
    other: Vec<Point2<f64>>,
) -> Result<Option<TransformPair>, MatchError> {
    let params = AlignParams::default();
    let outcome = align_with(reference, other, &params)?;
    Ok(outcome.accepted(&params.acceptance).copied())
}

/// Register `other` onto `reference` and return the full outcome.
///
/// The acceptance decision is logged; callers judge the outcome with
/// [`MatchOutcome::accepted`] and `params.acceptance`.
pub fn align_with(
    reference: Vec<Point2<f64>>,
    other: Vec<Point2<f64>>,
    params: &AlignParams,
) -> Result<MatchOutcome, MatchError> {
    params.search.validate()?;
    let matcher = Matcher::new(reference, params.quads.clone(), params.density)?;
    let outcome = matcher.find_transform(other, &params.search)?;
    debug!(
        "align: ratio {:.3}, accepted {}",
        outcome.best_ratio,
        outcome.is_accepted(&params.acceptance)
    );
    Ok(outcome)
}
