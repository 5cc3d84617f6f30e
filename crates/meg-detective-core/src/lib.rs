//! # MEG Detective Core
//!
//! Core building blocks for the MEG detective pipeline: the file-based
//! artifacts every stage exchanges, the error hierarchy, and the
//! deterministic synthetic session generator that plays the role of the
//! dataset provider.
//!
//! The pipeline itself is a chain of four batch stages (sensor-level
//! preprocessing, source reconstruction, ROI determination, time-resolved
//! decoding). Stages never share memory; every handoff is one `.npz`
//! artifact on disk, written once and read by the next stage. This crate
//! owns those artifact formats.
//!
//! ## Example
//!
//! ```rust,no_run
//! use meg_detective_core::io;
//! use meg_detective_core::paths::ArtifactPaths;
//!
//! let paths = ArtifactPaths::new("data");
//! let raw = io::load_raw(&paths.raw)?;
//! println!("{} channels, {} samples", raw.info.n_channels(), raw.n_samples());
//! # Ok::<(), meg_detective_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod io;
pub mod paths;
pub mod synthetic;
pub mod types;

pub use config::PipelineConfig;
pub use error::{ArtifactError, ConfigError, CoreError, DataError};
pub use paths::ArtifactPaths;
pub use types::{
    ChannelKind, Covariance, Epochs, EventList, Evoked, ForwardSolution, HemiSourceSpace,
    Hemisphere, Label, Raw, RecordingInfo, SourceEstimate,
};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_nonempty() {
        assert!(!VERSION.is_empty());
    }
}
