//! Geometric-hashing registration of 2D point sets.
//!
//! Both point sets are broken into quads: a frame pair (A, B) plus the two
//! points closest to the middle of AB. Each quad's code, the position of
//! its inner points in the frame where A = (0, 0) and B = (1, 1), is
//! invariant to similarity transforms, so quads whose codes agree are
//! candidate correspondences. Every candidate gives an affine transform
//! that is scored by how well it maps the whole "other" set onto the
//! reference; the best one wins.
//!
//! The geometric primitives (affine fit, k-d tree index, background
//! density) live in `quadmatch-core`.

mod builder;
mod error;
mod io;
mod matcher;
mod params;
mod quad;
mod score;

pub use builder::{QuadBuilder, QuadSet};
pub use error::MatchError;
pub use io::{
    load_points, mapping_from, parse_points_json, parse_points_text, Mapping, MatchConfig,
    MatchReport, QuadmatchIoError, QuadmatchRunError,
};
pub use matcher::{BestMatch, MatchOutcome, Matcher, SearchStats, TransformPair};
pub use params::{AcceptanceParams, QuadParams, RefineParams, SearchParams};
pub use quad::{Code, Quad, QUAD_POINTS};
pub use score::{MatchScorer, Score};

pub use quadmatch_core::{AffineTransform, BackgroundDensity};
