use nalgebra::{DMatrix, DVector, Matrix3, Point2};
use serde::{Deserialize, Serialize};

/// Singular values below `RANK_RCOND * s_max` count as zero when fitting.
const RANK_RCOND: f64 = 1e-9;

/// 2D affine map `x' = tx0 + tx1*x + tx2*y`, `y' = ty0 + ty1*x + ty2*y`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub tx: [f64; 3],
    pub ty: [f64; 3],
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        tx: [0.0, 1.0, 0.0],
        ty: [0.0, 0.0, 1.0],
    };

    pub fn new(tx: [f64; 3], ty: [f64; 3]) -> Self {
        Self { tx, ty }
    }

    /// Build from the top two rows of a homogeneous 3x3 matrix.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Self {
            tx: [m[(0, 2)], m[(0, 0)], m[(0, 1)]],
            ty: [m[(1, 2)], m[(1, 0)], m[(1, 1)]],
        }
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.tx[1], self.tx[2], self.tx[0], //
            self.ty[1], self.ty[2], self.ty[0], //
            0.0, 0.0, 1.0,
        )
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.tx[0] + self.tx[1] * p.x + self.tx[2] * p.y,
            self.ty[0] + self.ty[1] * p.x + self.ty[2] * p.y,
        )
    }

    pub fn apply_all(&self, points: &[Point2<f64>]) -> Vec<Point2<f64>> {
        points.iter().map(|&p| self.apply(p)).collect()
    }

    /// Determinant of the linear part. Negative values mean a mirror image.
    pub fn determinant(&self) -> f64 {
        self.tx[1] * self.ty[2] - self.tx[2] * self.ty[1]
    }

    /// Algebraic inverse, `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < 1e-15 {
            return None;
        }
        let a = self.ty[2] / det;
        let b = -self.tx[2] / det;
        let c = -self.ty[1] / det;
        let d = self.tx[1] / det;
        Some(Self {
            tx: [-(a * self.tx[0] + b * self.ty[0]), a, b],
            ty: [-(c * self.tx[0] + d * self.ty[0]), c, d],
        })
    }

    /// `self ∘ inner`: apply `inner` first, then `self`.
    pub fn compose(&self, inner: &Self) -> Self {
        Self::from_matrix(&(self.to_matrix() * inner.to_matrix()))
    }

    /// Largest absolute difference between corresponding coefficients.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        self.tx
            .iter()
            .chain(self.ty.iter())
            .zip(other.tx.iter().chain(other.ty.iter()))
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

/// Errors from [`fit_affine`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum AffineFitError {
    #[error("correspondence count mismatch (src={src}, dst={dst})")]
    LengthMismatch { src: usize, dst: usize },
    #[error("at least 3 correspondences are required, got {0}")]
    TooFewPoints(usize),
    #[error("degenerate correspondences: source points are collinear or coincident")]
    DegenerateQuad,
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalization(pts: &[Point2<f64>]) -> Option<(Point2<f64>, f64)> {
    let n = pts.len() as f64;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in pts {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if !(mean_dist > 1e-12) {
        return None;
    }
    Some((Point2::new(cx, cy), std::f64::consts::SQRT_2 / mean_dist))
}

/// Least-squares affine map taking `src[k]` onto `dst[k]`.
///
/// The x and y output equations are solved independently against the same
/// design matrix `[1, x, y]`. Source points are Hartley-normalized before the
/// SVD so the rank test is scale independent; the solution is mapped back to
/// the original frame.
pub fn fit_affine(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
) -> Result<AffineTransform, AffineFitError> {
    if src.len() != dst.len() {
        return Err(AffineFitError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 3 {
        return Err(AffineFitError::TooFewPoints(src.len()));
    }

    let (c, s) = normalization(src).ok_or(AffineFitError::DegenerateQuad)?;

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(n, 3);
    let mut bx = DVector::<f64>::zeros(n);
    let mut by = DVector::<f64>::zeros(n);
    for (k, (p, q)) in src.iter().zip(dst).enumerate() {
        a[(k, 0)] = 1.0;
        a[(k, 1)] = s * (p.x - c.x);
        a[(k, 2)] = s * (p.y - c.y);
        bx[k] = q.x;
        by[k] = q.y;
    }

    let svd = a.svd(true, true);
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    if !s_max.is_finite() || s_min <= RANK_RCOND * s_max {
        return Err(AffineFitError::DegenerateQuad);
    }

    let px = svd
        .solve(&bx, RANK_RCOND * s_max)
        .map_err(|_| AffineFitError::DegenerateQuad)?;
    let py = svd
        .solve(&by, RANK_RCOND * s_max)
        .map_err(|_| AffineFitError::DegenerateQuad)?;

    // u = p0 + p1*s*(x - cx) + p2*s*(y - cy)
    let denormalize = |p: &DVector<f64>| {
        [
            p[0] - s * (p[1] * c.x + p[2] * c.y),
            p[1] * s,
            p[2] * s,
        ]
    };

    Ok(AffineTransform {
        tx: denormalize(&px),
        ty: denormalize(&py),
    })
}
