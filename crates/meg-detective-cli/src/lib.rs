//! # MEG Detective CLI
//!
//! Stage runners for the MEG detective pipeline. The pipeline is a
//! find-the-bug exercise: somewhere in the chain hides a subtle
//! methodological mistake, and the intermediate artifacts under `data/`
//! are the clues. Run the stages in order and inspect what each one
//! writes.
//!
//! # Usage
//!
//! ```bash
//! # Produce the input dataset (raw recording + forward model)
//! detective simulate
//!
//! # The four analysis stages, in order
//! detective sensor-level
//! detective source-level
//! detective determine-rois
//! detective time-decoding
//!
//! # Or everything at once
//! detective run-all
//! ```
//!
//! All artifacts live at fixed paths under `data/`; there are no tunable
//! flags — the analysis parameters are part of the exercise.

#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use thiserror::Error;

use meg_detective_core::error::{CoreError, DataError};
use meg_detective_decode::DecodeError;
use meg_detective_signal::SignalError;
use meg_detective_source::SourceError;

pub mod stages;

/// Errors raised by a pipeline stage.
///
/// A stage aborts on the first error; nothing is retried and no partial
/// artifact is left behind.
#[derive(Debug, Error)]
pub enum StageError {
    /// Artifact or entity error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Entity invariant violation.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Sensor-level processing error.
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Beamformer / ROI error.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Decoding error.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// MEG detective command line interface.
#[derive(Parser, Debug)]
#[command(name = "detective")]
#[command(author, version, about = "A four-stage MEG analysis pipeline with a hidden flaw")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands, one per pipeline stage.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the synthetic input dataset (raw recording + forward model)
    Simulate,
    /// Stage 1: filter, epoch, average, and estimate the covariance
    SensorLevel,
    /// Stage 2: beamform the grand average into source space
    SourceLevel,
    /// Stage 3: find per-hemisphere activity peaks and grow ROI labels
    DetermineRois,
    /// Stage 4: decode left vs. right over time and plot the performance
    TimeDecoding,
    /// Run all four stages in order (simulating first if inputs are missing)
    RunAll,
    /// Display version information
    Version,
}

/// Execute one command against the fixed `data/` directory.
pub fn execute(command: &Commands) -> Result<(), StageError> {
    let paths = meg_detective_core::ArtifactPaths::new("data");
    let config = meg_detective_core::PipelineConfig::default();
    config.validate().map_err(CoreError::from)?;
    match command {
        Commands::Simulate => stages::simulate::run(&paths),
        Commands::SensorLevel => stages::sensor_level::run(&paths, &config),
        Commands::SourceLevel => stages::source_level::run(&paths, &config),
        Commands::DetermineRois => stages::determine_rois::run(&paths, &config),
        Commands::TimeDecoding => stages::time_decoding::run(&paths, &config),
        Commands::RunAll => {
            if !paths.raw.exists() || !paths.forward.exists() {
                stages::simulate::run(&paths)?;
            }
            stages::sensor_level::run(&paths, &config)?;
            stages::source_level::run(&paths, &config)?;
            stages::determine_rois::run(&paths, &config)?;
            stages::time_decoding::run(&paths, &config)
        }
        Commands::Version => {
            println!("detective {}", env!("CARGO_PKG_VERSION"));
            println!("core {}", meg_detective_core::VERSION);
            Ok(())
        }
    }
}
