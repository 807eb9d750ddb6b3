//! Enumeration of bounded-size quads over a point set.

use std::collections::HashSet;

use log::debug;
use nalgebra::Point2;
use quadmatch_core::SpatialIndex;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::quad::Quad;
use crate::{MatchError, QuadParams};

/// Builds quads whose frame axis `|AB|` lies in `[min_size, max_size]`.
///
/// For every point A, the `max_neighbors` nearest points B inside the size
/// window become frame candidates. The code points are the two points
/// closest to the midpoint of AB that lie strictly inside the circle with
/// diameter AB; pairs with fewer than two such points yield no quad. Each
/// unordered pair {A, B} is tried once.
#[derive(Clone, Debug)]
pub struct QuadBuilder {
    params: QuadParams,
}

impl QuadBuilder {
    pub fn new(params: QuadParams) -> Result<Self, MatchError> {
        params.validate()?;
        Ok(Self { params })
    }

    #[inline]
    pub fn params(&self) -> &QuadParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, index), fields(points = index.len()))
    )]
    pub fn build(&self, index: &SpatialIndex) -> Result<Vec<Quad>, MatchError> {
        let QuadParams {
            min_size,
            max_size,
            max_neighbors,
        } = self.params;

        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut quads = Vec::new();

        for a in 0..index.len() {
            let pa = index.point(a);
            // +1: the query point itself comes back first.
            for nb in index.query_knn(pa, max_neighbors.saturating_add(1), Some(max_size))? {
                if nb.index == a || nb.distance < min_size || nb.distance > max_size {
                    continue;
                }
                if !seen.insert((a.min(nb.index), a.max(nb.index))) {
                    continue;
                }
                if let Some(quad) = self.quad_for_axis(index, a, nb.index)? {
                    quads.push(quad);
                }
            }
        }

        debug!(
            "built {} quads from {} points ({} frame pairs, size {:.1}..{:.1})",
            quads.len(),
            index.len(),
            seen.len(),
            min_size,
            max_size
        );
        Ok(quads)
    }

    fn quad_for_axis(
        &self,
        index: &SpatialIndex,
        a: usize,
        b: usize,
    ) -> Result<Option<Quad>, MatchError> {
        let pa = index.point(a);
        let pb = index.point(b);
        let mid = Point2::new(0.5 * (pa.x + pb.x), 0.5 * (pa.y + pb.y));
        let radius = 0.5 * (pb - pa).norm();

        let interior: Vec<usize> = index
            .query_knn(mid, self.params.max_neighbors.saturating_add(2), Some(radius))?
            .into_iter()
            .filter(|n| n.index != a && n.index != b && n.distance < radius)
            .map(|n| n.index)
            .take(2)
            .collect();
        let &[c, d] = interior.as_slice() else {
            return Ok(None);
        };

        Ok(Quad::from_quadruple(
            [a, b, c, d],
            [pa, pb, index.point(c), index.point(d)],
        ))
    }
}

/// A point set prepared for matching: its spatial index and quads.
#[derive(Debug)]
pub struct QuadSet {
    index: SpatialIndex,
    quads: Vec<Quad>,
    params: QuadParams,
}

impl QuadSet {
    /// Index `points` and build their quads.
    ///
    /// Fails with `EmptyIndex` for an empty set and `InvalidParameters` for
    /// bad bounds, before any quad is built.
    pub fn build(points: Vec<Point2<f64>>, params: &QuadParams) -> Result<Self, MatchError> {
        let builder = QuadBuilder::new(params.clone())?;
        let index = SpatialIndex::new(points);
        if index.is_empty() {
            return Err(quadmatch_core::SpatialIndexError::EmptyIndex.into());
        }
        let quads = builder.build(&index)?;
        Ok(Self {
            index,
            quads,
            params: params.clone(),
        })
    }

    #[inline]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    #[inline]
    pub fn points(&self) -> &[Point2<f64>] {
        self.index.points()
    }

    #[inline]
    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    #[inline]
    pub fn params(&self) -> &QuadParams {
        &self.params
    }
}
