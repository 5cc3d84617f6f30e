//! # MEG Detective Source
//!
//! Source-level reconstruction for the MEG detective pipeline: the LCMV
//! beamformer (spatial filter construction and application) and the
//! region-of-interest logic (per-hemisphere peak search and surface label
//! growing). These implement pipeline stages 2 and 3 and the per-ROI
//! filters stage 4 builds on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod lcmv;
pub mod roi;

pub use lcmv::{apply_lcmv, apply_lcmv_epochs, make_lcmv, LcmvFilter};
pub use roi::{find_peak_vertex, grow_label};

use meg_detective_core::error::{CoreError, DataError};
use thiserror::Error;

/// Convenient `Result` alias for source-level operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors raised by beamforming and ROI determination.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A core entity or artifact error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An entity invariant was violated while assembling results.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Sensor sets of the inputs do not line up.
    #[error("Channel mismatch between {left} and {right}")]
    ChannelMismatch {
        /// First input.
        left: &'static str,
        /// Second input.
        right: &'static str,
    },

    /// The (regularized) covariance could not be inverted.
    #[error("Covariance matrix is singular even after regularization")]
    SingularCovariance,

    /// A source has a numerically zero leadfield and admits no beamformer
    /// weights.
    #[error("Source {index} has a numerically zero leadfield")]
    ZeroLeadfield {
        /// Global source index.
        index: usize,
    },

    /// The source estimate carries no vertices for the requested hemisphere.
    #[error("Source estimate has no {hemi} vertices")]
    EmptyHemisphere {
        /// Hemisphere short name.
        hemi: &'static str,
    },
}

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
