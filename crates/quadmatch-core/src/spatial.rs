//! Nearest-neighbor queries over a fixed point set.

use std::collections::HashMap;
use std::fmt;

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point2;

use crate::Bounds;

/// Errors returned by [`SpatialIndex`] queries.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialIndexError {
    #[error("spatial query on an empty point set")]
    EmptyIndex,
}

/// One query hit: index into the indexed point set and Euclidean distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

/// Immutable k-d tree over a 2D point set.
///
/// The index owns a copy of the points so callers can map hit indices back
/// to coordinates. Coincident points share one tree entry (a site) and are
/// expanded back to every original index on query, so any number of
/// duplicates is accepted. It is never mutated after construction and can
/// be shared across threads.
pub struct SpatialIndex {
    points: Vec<Point2<f64>>,
    tree: KdTree<f64, 2>,
    /// Original indices per site, ascending.
    sites: Vec<Vec<usize>>,
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("len", &self.points.len())
            .field("sites", &self.sites.len())
            .finish()
    }
}

fn by_distance_then_index(a: &Neighbor, b: &Neighbor) -> std::cmp::Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.index.cmp(&b.index))
}

/// Bit pattern key for exact coordinate equality; `-0.0` folds into `0.0`.
#[inline]
fn site_key(p: &Point2<f64>) -> (u64, u64) {
    ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits())
}

impl SpatialIndex {
    /// Build the index. An empty set is accepted, but every query on it
    /// fails with [`SpatialIndexError::EmptyIndex`].
    pub fn new(points: Vec<Point2<f64>>) -> Self {
        let mut site_of: HashMap<(u64, u64), usize> = HashMap::with_capacity(points.len());
        let mut coords: Vec<[f64; 2]> = Vec::with_capacity(points.len());
        let mut sites: Vec<Vec<usize>> = Vec::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            let site = *site_of.entry(site_key(p)).or_insert_with(|| {
                coords.push([p.x, p.y]);
                sites.push(Vec::with_capacity(1));
                sites.len() - 1
            });
            sites[site].push(i);
        }

        let tree: KdTree<f64, 2> = if coords.is_empty() {
            KdTree::new()
        } else {
            (&coords).into()
        };
        Self {
            points,
            tree,
            sites,
        }
    }

    pub fn from_xy(xy: &[[f64; 2]]) -> Self {
        Self::new(xy.iter().map(|&[x, y]| Point2::new(x, y)).collect())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of distinct coordinates.
    #[inline]
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    #[inline]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    #[inline]
    pub fn point(&self, index: usize) -> Point2<f64> {
        self.points[index]
    }

    /// Axis-aligned bounding box of the indexed points.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.points)
    }

    fn ensure_non_empty(&self) -> Result<(), SpatialIndexError> {
        if self.points.is_empty() {
            Err(SpatialIndexError::EmptyIndex)
        } else {
            Ok(())
        }
    }

    /// Every original point behind `site`, at `squared` distance.
    fn expand(&self, site: u64, squared: f64) -> impl Iterator<Item = Neighbor> + '_ {
        let distance = squared.sqrt();
        self.sites[site as usize]
            .iter()
            .map(move |&index| Neighbor { index, distance })
    }

    /// Closest indexed point to `p`. Among coincident points the lowest
    /// index is reported.
    pub fn nearest(&self, p: Point2<f64>) -> Result<Neighbor, SpatialIndexError> {
        self.ensure_non_empty()?;
        let nn = self.tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y]);
        Ok(Neighbor {
            index: self.sites[nn.item as usize][0],
            distance: nn.distance.sqrt(),
        })
    }

    /// Nearest neighbor of every query point, in query order.
    pub fn query(&self, points: &[Point2<f64>]) -> Result<Vec<Neighbor>, SpatialIndexError> {
        self.ensure_non_empty()?;
        points.iter().map(|&p| self.nearest(p)).collect()
    }

    /// Up to `k` nearest neighbors of `p`, ordered by increasing distance
    /// (ties by index). With `max_radius`, hits farther than the radius are
    /// dropped; the radius is inclusive.
    pub fn query_knn(
        &self,
        p: Point2<f64>,
        k: usize,
        max_radius: Option<f64>,
    ) -> Result<Vec<Neighbor>, SpatialIndexError> {
        self.ensure_non_empty()?;
        if k == 0 {
            return Ok(Vec::new());
        }
        // k sites hold at least k points, so the k nearest points are among them.
        let mut hits: Vec<Neighbor> = self
            .tree
            .nearest_n::<SquaredEuclidean>(&[p.x, p.y], k.min(self.sites.len()))
            .into_iter()
            .flat_map(|nn| self.expand(nn.item, nn.distance))
            .filter(|n| max_radius.map_or(true, |r| n.distance <= r))
            .collect();
        hits.sort_by(by_distance_then_index);
        hits.truncate(k);
        Ok(hits)
    }

    /// All points within `radius` of `p` (inclusive), nearest first.
    pub fn within(&self, p: Point2<f64>, radius: f64) -> Result<Vec<Neighbor>, SpatialIndexError> {
        self.ensure_non_empty()?;
        // Pad the squared radius so boundary points survive rounding; the
        // exact inclusive test happens on the Euclidean distance below.
        let padded = radius * radius * (1.0 + 1e-9);
        let mut hits: Vec<Neighbor> = self
            .tree
            .within::<SquaredEuclidean>(&[p.x, p.y], padded)
            .into_iter()
            .flat_map(|nn| self.expand(nn.item, nn.distance))
            .filter(|n| n.distance <= radius)
            .collect();
        hits.sort_by(by_distance_then_index);
        Ok(hits)
    }
}
