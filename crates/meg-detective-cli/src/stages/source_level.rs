//! Stage 2 — source reconstruction.
//!
//! Builds one LCMV beamformer from the epochs, data covariance, and forward
//! model, and projects the grand average (both conditions combined) into
//! source space.

use tracing::info;

use meg_detective_core::{io, ArtifactPaths, PipelineConfig};
use meg_detective_source::{apply_lcmv, make_lcmv};

use crate::StageError;

/// Run the source-reconstruction stage.
pub fn run(paths: &ArtifactPaths, config: &PipelineConfig) -> Result<(), StageError> {
    let epochs = io::load_epochs(&paths.epochs)?;
    let data_cov = io::load_covariance(&paths.covariance)?;
    let fwd = io::load_forward(&paths.forward)?;

    // One spatial filter over the whole source space.
    let filter = make_lcmv(&epochs.info, &fwd, &data_cov, config.reg, None)?;

    // Project the average over all epochs, both conditions combined.
    let evoked_all = epochs.average(None, "grand average")?;
    let stc = apply_lcmv(&evoked_all, &filter)?;

    io::save_stc(&paths.stc, &stc)?;

    info!(
        "source level done: {} sources x {} samples",
        stc.data.nrows(),
        stc.n_times()
    );
    Ok(())
}
