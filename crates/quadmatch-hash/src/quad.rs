//! Four-point invariant descriptors ("quads").
//!
//! A quad picks its most separated pair as the frame axis A, B and encodes
//! the remaining code points C, D in the similarity frame where A sits at
//! (0, 0) and B at (1, 1). The code `(cx, cy, dx, dy)` does not change
//! under rotation, uniform scale and translation of the whole point set.
//!
//! Canonical labeling:
//! 1. A, B is the most separated pair (the diameter of the quad).
//! 2. A and B are ordered so that `(cx + dx) / 2 <= 0.5`; swapping them is
//!    the 180° turn `v -> 1 - v` of every code component. When the mean x
//!    is exactly 0.5 the mean y decides the same way.
//! 3. C and D are ordered so that `cx <= dx` (then `cy <= dy`).
//!
//! Both point sets must use the same rule, otherwise matching quads get
//! different codes.

use nalgebra::Point2;
use quadmatch_core::{fit_affine, AffineFitError, AffineTransform};

/// Number of points in a quad.
pub const QUAD_POINTS: usize = 4;

/// Quad code: frame coordinates of C then D.
pub type Code = [f64; 4];

#[derive(Clone, Debug, PartialEq)]
pub struct Quad {
    /// Indices into the source point set, canonical order A, B, C, D.
    pub indices: [usize; QUAD_POINTS],
    /// Coordinates of the four points, same order as `indices`.
    pub points: [Point2<f64>; QUAD_POINTS],
    pub code: Code,
    /// Length of the frame axis `|AB|`.
    pub size: f64,
}

/// Coordinates of `p` in the frame mapping `a -> (0, 0)`, `b -> (1, 1)`.
#[inline]
fn frame_coords(a: Point2<f64>, b: Point2<f64>, p: Point2<f64>) -> [f64; 2] {
    let ab_x = b.x - a.x;
    let ab_y = b.y - a.y;
    let scale = ab_x * ab_x + ab_y * ab_y;
    let cos_t = (ab_x + ab_y) / scale;
    let sin_t = (ab_y - ab_x) / scale;
    let ap_x = p.x - a.x;
    let ap_y = p.y - a.y;
    [
        ap_x * cos_t + ap_y * sin_t,
        -ap_x * sin_t + ap_y * cos_t,
    ]
}

fn compute_code(points: &[Point2<f64>; QUAD_POINTS]) -> Code {
    let [cx, cy] = frame_coords(points[0], points[1], points[2]);
    let [dx, dy] = frame_coords(points[0], points[1], points[3]);
    [cx, cy, dx, dy]
}

/// Mean code x, then mean code y, as a total order. The canonical
/// labeling of A and B is the one with the smaller key.
#[inline]
fn orientation_key(code: &Code) -> (std::cmp::Ordering, std::cmp::Ordering) {
    let mean_x = (code[0] + code[2]) * 0.5;
    let mean_y = (code[1] + code[3]) * 0.5;
    (mean_x.total_cmp(&0.5), mean_y.total_cmp(&0.5))
}

impl Quad {
    /// Build the canonical quad for four points given in any order.
    ///
    /// Returns `None` when the frame axis has zero or non-finite length.
    pub fn from_quadruple(
        indices: [usize; QUAD_POINTS],
        points: [Point2<f64>; QUAD_POINTS],
    ) -> Option<Self> {
        let mut frame = (0, 1);
        let mut best = -1.0;
        for i in 0..QUAD_POINTS {
            for j in (i + 1)..QUAD_POINTS {
                let d = (points[i] - points[j]).norm_squared();
                if d > best {
                    best = d;
                    frame = (i, j);
                }
            }
        }
        if !(best > 0.0) || !best.is_finite() {
            return None;
        }

        let (fa, fb) = frame;
        let rest: Vec<usize> = (0..QUAD_POINTS).filter(|&k| k != fa && k != fb).collect();

        // Both labelings are computed from the points themselves, so the
        // choice between them does not depend on the input order.
        let forward = [fa, fb, rest[0], rest[1]];
        let backward = [fb, fa, rest[0], rest[1]];
        let code_fwd = compute_code(&forward.map(|k| points[k]));
        let code_bwd = compute_code(&backward.map(|k| points[k]));
        let (mut order, mut code) = if orientation_key(&code_bwd) < orientation_key(&code_fwd) {
            (backward, code_bwd)
        } else {
            (forward, code_fwd)
        };
        if code[0].total_cmp(&code[2]).then(code[1].total_cmp(&code[3])).is_gt() {
            order.swap(2, 3);
            code = [code[2], code[3], code[0], code[1]];
        }

        Some(Self {
            indices: order.map(|k| indices[k]),
            points: order.map(|k| points[k]),
            code,
            size: best.sqrt(),
        })
    }

    #[inline]
    pub fn code_distance(&self, other: &Quad) -> f64 {
        self.code
            .iter()
            .zip(other.code.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// Two quads match when their codes are within `tolerance` (Euclidean).
    #[inline]
    pub fn is_match(&self, other: &Quad, tolerance: f64) -> bool {
        self.code_distance(other) <= tolerance
    }

    /// Affine transform taking `other`'s points onto this quad's points.
    ///
    /// Uses the four correspondences A<->A', B<->B', C<->C', D<->D' in a
    /// least-squares fit. Fails with [`AffineFitError::DegenerateQuad`] when
    /// `other`'s points are collinear.
    pub fn transform_from(&self, other: &Quad) -> Result<AffineTransform, AffineFitError> {
        fit_affine(&other.points, &self.points)
    }
}
