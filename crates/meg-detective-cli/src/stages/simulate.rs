//! Dataset provider: write the synthetic raw recording and forward model.

use tracing::info;

use meg_detective_core::io;
use meg_detective_core::synthetic::{generate_session, SyntheticConfig};
use meg_detective_core::ArtifactPaths;

use crate::StageError;

/// Generate the synthetic session with the default configuration and write
/// the raw recording and forward model artifacts.
pub fn run(paths: &ArtifactPaths) -> Result<(), StageError> {
    run_with(paths, &SyntheticConfig::default())
}

/// Generate the synthetic session with an explicit configuration.
pub fn run_with(paths: &ArtifactPaths, config: &SyntheticConfig) -> Result<(), StageError> {
    let (raw, fwd) = generate_session(config)?;
    io::save_raw(&paths.raw, &raw)?;
    io::save_forward(&paths.forward, &fwd)?;
    info!(
        "simulated session written to {} and {}",
        paths.raw.display(),
        paths.forward.display()
    );
    Ok(())
}
