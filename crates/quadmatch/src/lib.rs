//! Affine registration of 2D point sets by geometric hashing.
//!
//! Give it two point sets that show the same scene (for example the same
//! field of fluorescent emitters seen through two camera channels) and it
//! finds the affine transform between them, without any initial guess.
//!
//! ## Quickstart
//!
//! ```no_run
//! use quadmatch::align;
//! use nalgebra::Point2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reference: Vec<Point2<f64>> = quadmatch::hash::load_points("channel0.txt")?;
//! let other: Vec<Point2<f64>> = quadmatch::hash::load_points("channel1.txt")?;
//!
//! match align(reference, other)? {
//!     Some(pair) => println!("other -> ref: {:?}", pair.other_to_ref),
//!     None => println!("no confident match"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `quadmatch::core`: affine transforms, the k-d tree index, density.
//! - `quadmatch::hash`: quads, the matcher, parameters, file I/O.
//! - [`align`] / [`align_with`]: one-call registration with an acceptance
//!   decision.
//!
//! The `quadmatch` binary (feature `cli`) wraps [`hash::MatchConfig`].

pub use quadmatch_core as core;
pub use quadmatch_hash as hash;

pub use quadmatch_core::{AffineTransform, BackgroundDensity};
pub use quadmatch_hash::{
    AcceptanceParams, MatchError, MatchOutcome, Matcher, QuadParams, SearchParams, TransformPair,
};

mod align;

pub use align::{align, align_with, AlignParams};
