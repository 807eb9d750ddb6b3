use std::sync::atomic::AtomicBool;

use approx::assert_abs_diff_eq;
use nalgebra::Point2;
use quadmatch_hash::{
    AcceptanceParams, AffineTransform, BackgroundDensity, MatchError, MatchOutcome, MatchScorer,
    Matcher, QuadParams, QuadSet, SearchParams,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const EXTENT: f64 = 300.0;

fn random_points(rng: &mut StdRng, n: usize) -> Vec<Point2<f64>> {
    (0..n)
        .map(|_| Point2::new(rng.gen_range(0.0..EXTENT), rng.gen_range(0.0..EXTENT)))
        .collect()
}

fn jitter(rng: &mut StdRng, points: &[Point2<f64>], sigma: f64) -> Vec<Point2<f64>> {
    let normal = Normal::new(0.0, sigma).expect("normal");
    points
        .iter()
        .map(|p| Point2::new(p.x + normal.sample(rng), p.y + normal.sample(rng)))
        .collect()
}

fn quad_params() -> QuadParams {
    QuadParams {
        min_size: 5.0,
        max_size: 150.0,
        max_neighbors: 10,
    }
}

fn refined(tolerance: f64) -> SearchParams {
    let mut params = SearchParams::with_tolerance(tolerance);
    params.refine.enabled = true;
    params
}

fn sheared() -> AffineTransform {
    AffineTransform::new([5.0, 1.0, 0.05], [-3.0, -0.02, 0.98])
}

fn assert_close_to(actual: &AffineTransform, expected: &AffineTransform) {
    for k in 1..3 {
        assert_abs_diff_eq!(actual.tx[k], expected.tx[k], epsilon = 1e-2);
        assert_abs_diff_eq!(actual.ty[k], expected.ty[k], epsilon = 1e-2);
    }
    assert_abs_diff_eq!(actual.tx[0], expected.tx[0], epsilon = 1.0);
    assert_abs_diff_eq!(actual.ty[0], expected.ty[0], epsilon = 1.0);
}

#[test]
fn identical_sets_reach_maximum_ratio() {
    let mut rng = StdRng::seed_from_u64(7);
    let reference = random_points(&mut rng, 40);
    let matcher =
        Matcher::new(reference.clone(), quad_params(), BackgroundDensity::Estimate).expect("matcher");

    let outcome = matcher
        .find_transform(reference, &SearchParams::default())
        .expect("search");
    let best = outcome.best.as_ref().expect("match");

    assert_abs_diff_eq!(
        outcome.best_ratio,
        -matcher.bg_probability().ln(),
        epsilon = 1e-9
    );
    assert!(best
        .transforms
        .other_to_ref
        .max_abs_diff(&AffineTransform::IDENTITY)
        < 1e-6);
    assert!(best
        .transforms
        .ref_to_other
        .max_abs_diff(&AffineTransform::IDENTITY)
        < 1e-6);
    assert!(outcome.is_accepted(&AcceptanceParams::default()));
    assert!(outcome.stats.matches >= outcome.stats.ref_quads);
}

#[test]
fn recovers_sheared_transform_under_noise() {
    let mut rng = StdRng::seed_from_u64(42);
    let reference = random_points(&mut rng, 40);
    let truth = sheared();
    let other = jitter(&mut rng, &truth.apply_all(&reference), 0.2);

    let matcher =
        Matcher::new(reference.clone(), quad_params(), BackgroundDensity::Estimate).expect("matcher");
    let outcome = matcher.find_transform(other, &refined(0.1)).expect("search");

    let pair = outcome
        .accepted(&AcceptanceParams::default())
        .unwrap_or_else(|| panic!("not accepted, ratio {}", outcome.best_ratio));
    assert_close_to(&pair.ref_to_other, &truth);
    let inverse = truth.inverse().expect("invertible");
    assert_close_to(&pair.other_to_ref, &inverse);

    // Round trip through both fitted directions stays close to identity.
    for p in &reference {
        let back = pair.other_to_ref.apply(pair.ref_to_other.apply(*p));
        assert!((back - p).norm() < 1.0, "round trip drift at {p:?}");
    }
}

#[test]
fn partial_overlap_with_extra_points_still_matches() {
    let mut rng = StdRng::seed_from_u64(5);
    let reference = random_points(&mut rng, 40);
    let truth = sheared();
    let mut other = jitter(&mut rng, &truth.apply_all(&reference[..32]), 0.2);
    other.extend(random_points(&mut rng, 6));

    let matcher =
        Matcher::new(reference, quad_params(), BackgroundDensity::Estimate).expect("matcher");
    let outcome = matcher
        .find_transform(other, &refined(0.1))
        .expect("search");

    let pair = outcome
        .accepted(&AcceptanceParams::default())
        .unwrap_or_else(|| panic!("not accepted, ratio {}", outcome.best_ratio));
    assert_close_to(&pair.ref_to_other, &truth);
}

#[test]
fn unrelated_sets_are_not_accepted() {
    let acceptance = AcceptanceParams::default();
    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(1000 + seed);
        let reference = random_points(&mut rng, 40);
        let other = random_points(&mut rng, 40);
        let matcher =
            Matcher::new(reference, quad_params(), BackgroundDensity::Estimate).expect("matcher");
        let outcome = matcher
            .find_transform(other, &SearchParams::default())
            .expect("search");
        assert!(
            !outcome.is_accepted(&acceptance),
            "seed {seed}: coincidental ratio {}",
            outcome.best_ratio
        );
        assert!(outcome.best_ratio >= 0.0);
    }
}

#[test]
fn search_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(11);
    let reference = random_points(&mut rng, 35);
    let other = jitter(&mut rng, &sheared().apply_all(&reference), 0.2);
    let matcher =
        Matcher::new(reference, quad_params(), BackgroundDensity::Estimate).expect("matcher");
    let params = SearchParams::with_tolerance(0.1);

    let a = matcher.find_transform(other.clone(), &params).expect("first");
    let b = matcher.find_transform(other, &params).expect("second");
    assert_eq!(a, b);
}

#[test]
fn refinement_never_lowers_the_ratio() {
    let mut rng = StdRng::seed_from_u64(3);
    let reference = random_points(&mut rng, 40);
    let other = jitter(&mut rng, &sheared().apply_all(&reference), 0.3);
    let matcher =
        Matcher::new(reference, quad_params(), BackgroundDensity::Estimate).expect("matcher");

    let unrefined = matcher
        .find_transform(other.clone(), &SearchParams::with_tolerance(0.1))
        .expect("raw");
    let tweaked = matcher.find_transform(other, &refined(0.1)).expect("refined");

    assert!(unrefined.best.as_ref().expect("match").refined_inliers.is_none());
    assert_eq!(unrefined.stats.refine_rounds, 0);
    assert!(tweaked.best_ratio >= unrefined.best_ratio);
    if tweaked.stats.refine_rounds > 0 {
        assert!(tweaked.best_ratio > unrefined.best_ratio);
        assert!(tweaked.best.expect("match").refined_inliers.expect("inliers") >= 3);
    }
}

#[test]
fn collinear_points_only_produce_degenerate_candidates() {
    let line: Vec<Point2<f64>> = (0..10)
        .map(|i| {
            let x = 10.0 * i as f64 + if i % 2 == 0 { 0.0 } else { 1.5 };
            Point2::new(x, 0.5 * x + 3.0)
        })
        .collect();
    let matcher =
        Matcher::new(line.clone(), quad_params(), BackgroundDensity::Estimate).expect("matcher");
    assert!(!matcher.reference().quads().is_empty());

    let outcome = matcher
        .find_transform(line, &SearchParams::default())
        .expect("search");
    assert!(outcome.best.is_none());
    assert_eq!(outcome.best_ratio, 0.0);
    assert!(outcome.stats.degenerate > 0);
    assert_eq!(outcome.stats.degenerate, outcome.stats.matches);
}

#[test]
fn too_few_points_is_no_match_not_error() {
    let reference = vec![
        Point2::new(0.0, 0.0),
        Point2::new(10.0, 0.0),
        Point2::new(0.0, 10.0),
    ];
    let matcher = Matcher::new(reference.clone(), QuadParams::default(), BackgroundDensity::Estimate)
        .expect("matcher");
    let outcome = matcher
        .find_transform(reference, &SearchParams::default())
        .expect("search");
    assert!(outcome.best.is_none());
    assert_eq!(outcome.best_ratio, 0.0);
    assert_eq!(outcome.stats.ref_quads, 0);
}

#[test]
fn zero_timeout_returns_without_searching() {
    let mut rng = StdRng::seed_from_u64(9);
    let reference = random_points(&mut rng, 30);
    let matcher =
        Matcher::new(reference.clone(), quad_params(), BackgroundDensity::Estimate).expect("matcher");
    assert!(!matcher.reference().quads().is_empty());

    let params = SearchParams {
        timeout_ms: Some(0),
        ..SearchParams::default()
    };
    let outcome = matcher.find_transform(reference, &params).expect("search");
    assert!(outcome.stats.timed_out);
    assert_eq!(outcome.stats.comparisons, 0);
    assert!(outcome.best.is_none());
}

#[test]
fn abort_flag_stops_the_search() {
    let mut rng = StdRng::seed_from_u64(10);
    let reference = random_points(&mut rng, 30);
    let matcher =
        Matcher::new(reference.clone(), quad_params(), BackgroundDensity::Estimate).expect("matcher");

    let abort = AtomicBool::new(true);
    let outcome = matcher
        .find_transform_with_abort(reference.clone(), &SearchParams::default(), &abort)
        .expect("search");
    assert!(outcome.stats.timed_out);
    assert!(outcome.best.is_none());

    let keep_going = AtomicBool::new(false);
    let outcome = matcher
        .find_transform_with_abort(reference, &SearchParams::default(), &keep_going)
        .expect("search");
    assert!(!outcome.stats.timed_out);
    assert!(outcome.best.is_some());
}

#[test]
fn explicit_density_sets_background() {
    let mut rng = StdRng::seed_from_u64(12);
    let reference = random_points(&mut rng, 20);
    let matcher = Matcher::new(reference.clone(), quad_params(), BackgroundDensity::Area(512.0 * 512.0))
        .expect("matcher");
    assert_abs_diff_eq!(matcher.bg_probability(), 1.0 / (512.0 * 512.0));

    let err = Matcher::new(reference, quad_params(), BackgroundDensity::Probability(1.5))
        .expect_err("probability above one");
    assert!(matches!(err, MatchError::Density(_)));
}

#[test]
fn invalid_inputs_fail_fast() {
    let mut rng = StdRng::seed_from_u64(13);
    let reference = random_points(&mut rng, 20);

    let err = Matcher::new(Vec::new(), quad_params(), BackgroundDensity::Estimate)
        .expect_err("empty reference");
    assert!(matches!(err, MatchError::Index(_)));

    let inverted = QuadParams {
        min_size: 100.0,
        max_size: 10.0,
        max_neighbors: 10,
    };
    let err = Matcher::new(reference.clone(), inverted, BackgroundDensity::Estimate)
        .expect_err("inverted bounds");
    assert!(matches!(err, MatchError::InvalidParameters(_)));

    let matcher =
        Matcher::new(reference.clone(), quad_params(), BackgroundDensity::Estimate).expect("matcher");
    let err = matcher
        .find_transform(reference, &SearchParams::with_tolerance(-1.0))
        .expect_err("negative tolerance");
    assert!(matches!(err, MatchError::InvalidParameters(_)));

    let err = matcher
        .find_transform(Vec::new(), &SearchParams::default())
        .expect_err("empty other");
    assert!(matches!(err, MatchError::Index(_)));
}

#[test]
fn other_quad_bounds_can_differ_from_reference() {
    let mut rng = StdRng::seed_from_u64(21);
    let reference = random_points(&mut rng, 40);
    let scale = AffineTransform::new([0.0, 0.5, 0.0], [0.0, 0.0, 0.5]);
    let other = scale.apply_all(&reference);

    let matcher =
        Matcher::new(reference, quad_params(), BackgroundDensity::Estimate).expect("matcher");
    let params = SearchParams {
        quads: Some(QuadParams {
            min_size: 2.5,
            max_size: 75.0,
            max_neighbors: 10,
        }),
        ..SearchParams::default()
    };
    let outcome = matcher.find_transform(other, &params).expect("search");
    let pair = outcome
        .accepted(&AcceptanceParams::default())
        .expect("accepted");
    assert!(pair.ref_to_other.max_abs_diff(&scale) < 1e-6);
}

type PairPick = (f64, [usize; 4], [usize; 4]);

/// Plain nested loop over quad pairs: strictly higher ratio wins, so on
/// ties the first pair in enumeration order is kept.
fn first_best_pair(matcher: &Matcher, other: &QuadSet, tolerance: f64) -> Option<PairPick> {
    let scorer = MatchScorer::new(matcher.bg_probability());
    let reference = matcher.reference();
    let mut best: Option<PairPick> = None;
    for q_ref in reference.quads() {
        for q_other in other.quads() {
            if !q_ref.is_match(q_other, tolerance) {
                continue;
            }
            let Ok(other_to_ref) = q_ref.transform_from(q_other) else {
                continue;
            };
            let ratio = scorer
                .score(reference.index(), other.points(), &other_to_ref)
                .expect("score")
                .ratio;
            let current = best.map_or(0.0, |b| b.0);
            if ratio > current && q_other.transform_from(q_ref).is_ok() {
                best = Some((ratio, q_ref.indices, q_other.indices));
            }
        }
    }
    best
}

fn picked(outcome: &MatchOutcome) -> Option<PairPick> {
    outcome
        .best
        .as_ref()
        .map(|b| (outcome.best_ratio, b.ref_quad, b.other_quad))
}

fn tied_scene() -> (Matcher, QuadSet) {
    let mut rng = StdRng::seed_from_u64(77);
    let points = random_points(&mut rng, 40);
    let matcher =
        Matcher::new(points.clone(), quad_params(), BackgroundDensity::Estimate).expect("matcher");
    let other = matcher
        .prepare_other(points, &SearchParams::default())
        .expect("other");
    (matcher, other)
}

#[test]
fn ties_resolve_to_earliest_quad_pair() {
    let (matcher, other) = tied_scene();
    let params = SearchParams::default();
    let outcome = matcher
        .match_quad_set(&other, &params, None)
        .expect("search");

    let expected = first_best_pair(&matcher, &other, params.tolerance).expect("match");
    assert_eq!(picked(&outcome), Some(expected));
    // Identical sets: every self-paired quad reaches the same top ratio.
    assert!(outcome.stats.matches >= outcome.stats.ref_quads);
}

#[cfg(feature = "rayon")]
#[test]
fn parallel_reduction_matches_nested_loop() {
    let (matcher, other) = tied_scene();
    let params = SearchParams::default();
    let expected = first_best_pair(&matcher, &other, params.tolerance).expect("match");
    for _ in 0..8 {
        let outcome = matcher
            .match_quad_set(&other, &params, None)
            .expect("search");
        assert_eq!(picked(&outcome), Some(expected));
    }
}

#[test]
fn stacked_duplicate_points_are_matched() {
    let mut rng = StdRng::seed_from_u64(15);
    let mut reference = random_points(&mut rng, 30);
    reference.extend(std::iter::repeat(Point2::new(150.0, 150.0)).take(40));
    let matcher = Matcher::new(reference.clone(), quad_params(), BackgroundDensity::Estimate)
        .expect("matcher");
    assert_eq!(matcher.reference().points().len(), 70);

    let outcome = matcher
        .find_transform(reference, &SearchParams::default())
        .expect("search");
    assert!(outcome.is_accepted(&AcceptanceParams::default()));
    let pair = outcome.best_transform().expect("transform");
    assert!(pair.other_to_ref.max_abs_diff(&AffineTransform::IDENTITY) < 1e-6);
}
