use quadmatch_core::{DensityError, SpatialIndexError};

/// Errors that abort quad construction or a matching call.
///
/// A degenerate quad pair is not an error at this level: the search skips
/// it and counts it in [`crate::SearchStats::degenerate`]. Finding no match
/// is a normal outcome with `best_ratio == 0.0`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error(transparent)]
    Index(#[from] SpatialIndexError),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error(transparent)]
    Density(#[from] DensityError),
}

impl MatchError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}
