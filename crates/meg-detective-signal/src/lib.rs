//! # MEG Detective Signal
//!
//! Sensor-level processing for the MEG detective pipeline: band-pass
//! filtering, stimulus-event detection, stimulus-locked epoching with
//! decimation, and shrunk covariance estimation. Together these implement
//! the first pipeline stage; the individual operations are exposed so tests
//! and downstream tools can exercise them in isolation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod covariance;
pub mod epochs;
pub mod events;
pub mod filter;

pub use covariance::{compute_covariance, ledoit_wolf};
pub use epochs::epoch_around_events;
pub use events::find_events;
pub use filter::band_pass;

use meg_detective_core::error::{CoreError, DataError};
use thiserror::Error;

/// Convenient `Result` alias for signal operations.
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors raised by sensor-level processing.
#[derive(Debug, Error)]
pub enum SignalError {
    /// A core entity or artifact error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An entity invariant was violated while assembling results.
    #[error(transparent)]
    Data(#[from] DataError),

    /// The filter design routine rejected the requested parameters.
    #[error("Filter design failed: {message}")]
    FilterDesign {
        /// Description of the failure.
        message: String,
    },

    /// The recording has no stimulus channel to read events from.
    #[error("Recording has no stimulus channel")]
    NoStimChannel,

    /// No event matched the requested condition codes.
    #[error("No events matched codes {codes:?}")]
    NoMatchingEvents {
        /// The codes that were searched for.
        codes: Vec<i32>,
    },

    /// A requested time window selects no samples.
    #[error("Window [{tmin}, {tmax}] s selects no samples")]
    EmptyWindow {
        /// Window start in seconds.
        tmin: f64,
        /// Window end in seconds.
        tmax: f64,
    },
}

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
