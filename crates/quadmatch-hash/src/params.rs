use serde::{Deserialize, Serialize};

use crate::MatchError;

/// Bounds on which quads are built from a point set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadParams {
    /// Shortest accepted frame axis `|AB|`, in point-set units.
    pub min_size: f64,
    /// Longest accepted frame axis `|AB|`.
    pub max_size: f64,
    /// Nearest neighbors of each point considered as frame partners.
    pub max_neighbors: usize,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            min_size: 5.0,
            max_size: 100.0,
            max_neighbors: 20,
        }
    }
}

impl QuadParams {
    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.min_size.is_finite() || self.min_size <= 0.0 {
            return Err(MatchError::invalid(format!(
                "min_size must be positive, got {}",
                self.min_size
            )));
        }
        if !self.max_size.is_finite() || self.max_size <= 0.0 {
            return Err(MatchError::invalid(format!(
                "max_size must be positive, got {}",
                self.max_size
            )));
        }
        if self.min_size >= self.max_size {
            return Err(MatchError::invalid(format!(
                "min_size ({}) must be smaller than max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.max_neighbors == 0 {
            return Err(MatchError::invalid("max_neighbors must be at least 1"));
        }
        Ok(())
    }
}

/// Least-squares refinement of the winning transform on all inlier pairs.
///
/// Off by default: the outcome then carries the ratio of the best quad pair
/// itself, which is what the default acceptance threshold is tuned for.
/// When enabled, `best_ratio` is the score of the refined transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineParams {
    pub enabled: bool,
    /// Max residual (reference units) for a nearest-neighbor pair to count.
    pub inlier_radius: f64,
    pub iterations: usize,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            enabled: false,
            inlier_radius: 2.0,
            iterations: 2,
        }
    }
}

/// Per-call search settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Max Euclidean distance between two quad codes to call them a match.
    ///
    /// Dimensionless (normalized-frame units). Loosen it when localization
    /// noise is large relative to quad size or the transform has shear.
    pub tolerance: f64,
    /// Quad bounds for the other set; `None` reuses the reference bounds.
    pub quads: Option<QuadParams>,
    pub refine: RefineParams,
    /// Stop after this many milliseconds and return the best so far.
    pub timeout_ms: Option<u64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-2,
            quads: None,
            refine: RefineParams::default(),
            timeout_ms: None,
        }
    }
}

impl SearchParams {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(MatchError::invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if let Some(quads) = &self.quads {
            quads.validate()?;
        }
        if self.refine.enabled
            && (!self.refine.inlier_radius.is_finite() || self.refine.inlier_radius <= 0.0)
        {
            return Err(MatchError::invalid(format!(
                "refine.inlier_radius must be positive, got {}",
                self.refine.inlier_radius
            )));
        }
        Ok(())
    }
}

/// Caller-side acceptance policy.
///
/// Ratios up to ~9.7 are seen for coincidental matches, so the default
/// threshold sits at 10.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptanceParams {
    pub min_ratio: f64,
}

impl Default for AcceptanceParams {
    fn default() -> Self {
        Self { min_ratio: 10.0 }
    }
}
