//! The quad x quad search and its reduction to a single best candidate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::trace;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::TransformPair;
use crate::builder::QuadSet;
use crate::quad::Quad;
use crate::score::MatchScorer;
use crate::MatchError;

#[derive(Clone, Debug)]
pub(super) struct Candidate {
    pub ratio: f64,
    pub fg_probability: f64,
    /// (reference quad, other quad) position in enumeration order.
    pub position: (usize, usize),
    pub ref_quad: [usize; 4],
    pub other_quad: [usize; 4],
    pub transforms: TransformPair,
}

impl Candidate {
    /// Strictly higher ratio wins; on a tie the earlier pair wins.
    fn beats(&self, other: &Candidate) -> bool {
        self.ratio > other.ratio || (self.ratio == other.ratio && self.position < other.position)
    }
}

/// Best candidate and counters over a range of reference quads.
#[derive(Clone, Debug, Default)]
pub(super) struct Partial {
    pub best: Option<Candidate>,
    pub comparisons: usize,
    pub matches: usize,
    pub degenerate: usize,
    pub skipped_rows: usize,
}

impl Partial {
    fn merge(mut self, other: Partial) -> Partial {
        self.comparisons += other.comparisons;
        self.matches += other.matches;
        self.degenerate += other.degenerate;
        self.skipped_rows += other.skipped_rows;
        self.best = match (self.best, other.best) {
            (Some(a), Some(b)) => Some(if b.beats(&a) { b } else { a }),
            (a, b) => a.or(b),
        };
        self
    }
}

pub(super) struct SearchContext<'a> {
    pub reference: &'a QuadSet,
    pub other: &'a QuadSet,
    pub scorer: &'a MatchScorer,
    pub tolerance: f64,
    pub deadline: Option<Instant>,
    pub abort: Option<&'a AtomicBool>,
}

impl SearchContext<'_> {
    fn should_stop(&self) -> bool {
        self.abort.is_some_and(|flag| flag.load(Ordering::Relaxed))
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Compare one reference quad against every other quad.
    fn search_row(&self, i: usize, q_ref: &Quad) -> Result<Partial, MatchError> {
        let mut part = Partial::default();
        if self.should_stop() {
            part.skipped_rows = 1;
            return Ok(part);
        }

        for (j, q_other) in self.other.quads().iter().enumerate() {
            part.comparisons += 1;
            if !q_ref.is_match(q_other, self.tolerance) {
                continue;
            }
            part.matches += 1;

            let other_to_ref = match q_ref.transform_from(q_other) {
                Ok(t) => t,
                Err(err) => {
                    trace!("skipping quad pair {i}/{j}: {err}");
                    part.degenerate += 1;
                    continue;
                }
            };
            let score =
                self.scorer
                    .score(self.reference.index(), self.other.points(), &other_to_ref)?;
            trace!(
                "match {i}/{j}: fg_p={:.3} bg_p={:.2e} ratio={:.2}",
                score.fg_probability,
                self.scorer.bg_probability(),
                score.ratio
            );

            let current = part.best.as_ref().map_or(0.0, |c| c.ratio);
            if score.ratio <= current {
                continue;
            }
            let ref_to_other = match q_other.transform_from(q_ref) {
                Ok(t) => t,
                Err(err) => {
                    trace!("skipping quad pair {i}/{j} (reverse fit): {err}");
                    part.degenerate += 1;
                    continue;
                }
            };
            part.best = Some(Candidate {
                ratio: score.ratio,
                fg_probability: score.fg_probability,
                position: (i, j),
                ref_quad: q_ref.indices,
                other_quad: q_other.indices,
                transforms: TransformPair {
                    other_to_ref,
                    ref_to_other,
                },
            });
        }
        Ok(part)
    }

    #[cfg(not(feature = "rayon"))]
    pub fn run(&self) -> Result<Partial, MatchError> {
        let mut acc = Partial::default();
        for (i, q_ref) in self.reference.quads().iter().enumerate() {
            acc = acc.merge(self.search_row(i, q_ref)?);
        }
        Ok(acc)
    }

    #[cfg(feature = "rayon")]
    pub fn run(&self) -> Result<Partial, MatchError> {
        self.reference
            .quads()
            .par_iter()
            .enumerate()
            .map(|(i, q_ref)| self.search_row(i, q_ref))
            .try_reduce(Partial::default, |a, b| Ok(a.merge(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadmatch_core::AffineTransform;

    fn candidate(ratio: f64, position: (usize, usize)) -> Candidate {
        Candidate {
            ratio,
            fg_probability: 0.0,
            position,
            ref_quad: [0; 4],
            other_quad: [0; 4],
            transforms: TransformPair {
                other_to_ref: AffineTransform::IDENTITY,
                ref_to_other: AffineTransform::IDENTITY,
            },
        }
    }

    fn partial(best: Option<Candidate>) -> Partial {
        Partial {
            best,
            comparisons: 3,
            matches: 1,
            ..Partial::default()
        }
    }

    #[test]
    fn merge_keeps_higher_ratio_and_sums_counters() {
        let merged = partial(Some(candidate(4.0, (0, 1)))).merge(partial(Some(candidate(6.0, (2, 0)))));
        assert_eq!(merged.best.expect("best").position, (2, 0));
        assert_eq!(merged.comparisons, 6);
        assert_eq!(merged.matches, 2);
    }

    #[test]
    fn merge_ties_resolve_to_earliest_pair() {
        let early = candidate(5.0, (1, 3));
        let late = candidate(5.0, (4, 0));
        let a = partial(Some(early.clone())).merge(partial(Some(late.clone())));
        let b = partial(Some(late)).merge(partial(Some(early)));
        assert_eq!(a.best.expect("best").position, (1, 3));
        assert_eq!(b.best.expect("best").position, (1, 3));
    }

    #[test]
    fn merge_with_empty_side_keeps_existing() {
        let merged = partial(None).merge(partial(Some(candidate(1.0, (0, 0)))));
        assert!(merged.best.is_some());
        assert!(partial(None).merge(partial(None)).best.is_none());
    }
}
