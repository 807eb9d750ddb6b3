//! Geometry primitives for quad-based point-set registration.
//!
//! This crate is purely geometric: it knows nothing about quads or the
//! search that uses them. It provides
//! - [`AffineTransform`] and least-squares affine fitting,
//! - [`SpatialIndex`], a k-d tree over a fixed 2D point set,
//! - background density estimation for likelihood scoring,
//! - a small stderr logger.

mod affine;
mod density;
mod logger;
mod spatial;

pub use affine::{fit_affine, AffineFitError, AffineTransform};
pub use density::{BackgroundDensity, Bounds, DensityError};
pub use spatial::{Neighbor, SpatialIndex, SpatialIndexError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
