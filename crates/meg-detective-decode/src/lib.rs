//! # MEG Detective Decode
//!
//! Time-resolved decoding for the MEG detective pipeline: assembling the
//! per-trial ROI feature tensor, sliding-window logistic regression with
//! cross-validated ROC-AUC scoring, and the performance-over-time figure.
//! This implements pipeline stage 4; the trained classifiers are never
//! persisted — only the figure is.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod features;
pub mod logistic;
pub mod plot;
pub mod sliding;

pub use features::{assemble_features, zscore_trials, FeatureSet};
pub use logistic::LogisticRegression;
pub use plot::plot_performance;
pub use sliding::{cross_val_scores, roc_auc, stratified_folds, SlidingDecoder};

use meg_detective_core::error::{CoreError, DataError};
use thiserror::Error;

/// Convenient `Result` alias for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors raised by the decoding stage.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A core entity or artifact error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An entity invariant was violated while assembling results.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Two feature tensors disagree on a dimension.
    #[error("Feature shape mismatch: {message}")]
    ShapeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// Classification requires exactly two classes.
    #[error("Expected exactly two classes, found {found:?}")]
    DegenerateClasses {
        /// The distinct codes that were found.
        found: Vec<i32>,
    },

    /// Not enough trials of some class to fill every fold.
    #[error("Smallest class has {smallest} trials, fewer than {n_folds} folds")]
    TooFewTrials {
        /// Trial count of the smallest class.
        smallest: usize,
        /// Requested number of folds.
        n_folds: usize,
    },

    /// The plotting backend failed.
    #[error("Plotting failed: {message}")]
    Plot {
        /// Backend error description.
        message: String,
    },
}

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
