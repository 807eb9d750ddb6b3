//! Background (null-hypothesis) density used by likelihood scoring.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum DensityError {
    #[error("cannot estimate density of an empty point set")]
    Empty,
    #[error("point bounding box has zero area ({width} x {height})")]
    Degenerate { width: f64, height: f64 },
    #[error("area must be finite and greater than 1, got {0}")]
    InvalidArea(f64),
    #[error("background probability must lie in (0, 1), got {0}")]
    InvalidProbability(f64),
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl Bounds {
    pub fn from_points(points: &[Point2<f64>]) -> Option<Self> {
        let first = points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some(Self { min, max })
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// How the background probability `bg_p` of the reference set is obtained.
///
/// `bg_p` is the chance that a random location coincides with a reference
/// point, i.e. one over the addressable area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundDensity {
    /// Use the bounding box of the reference points as the area.
    #[default]
    Estimate,
    /// Known addressable area (e.g. image width * height).
    Area(f64),
    /// Explicit background probability.
    Probability(f64),
}

impl BackgroundDensity {
    /// Resolve to a probability in (0, 1) for the given reference points.
    pub fn resolve(self, reference: &[Point2<f64>]) -> Result<f64, DensityError> {
        let p = match self {
            Self::Probability(p) => p,
            Self::Area(area) => {
                if !area.is_finite() || area <= 1.0 {
                    return Err(DensityError::InvalidArea(area));
                }
                1.0 / area
            }
            Self::Estimate => {
                let bounds = Bounds::from_points(reference).ok_or(DensityError::Empty)?;
                let area = bounds.area();
                if !(area > 0.0) {
                    return Err(DensityError::Degenerate {
                        width: bounds.width(),
                        height: bounds.height(),
                    });
                }
                if area <= 1.0 {
                    log::warn!("reference bounding box area {area:.3} is too small to score against");
                    return Err(DensityError::InvalidArea(area));
                }
                1.0 / area
            }
        };
        if !(p > 0.0 && p < 1.0) {
            return Err(DensityError::InvalidProbability(p));
        }
        Ok(p)
    }
}
