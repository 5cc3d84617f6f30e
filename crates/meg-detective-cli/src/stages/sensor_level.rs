//! Stage 1 — sensor-level preprocessing.
//!
//! Raw → filter → events → epochs → averages → covariance. Writes four
//! artifacts for the downstream stages: the event list, the epochs, the
//! evoked pair, and the data covariance.

use tracing::info;

use meg_detective_core::types::ChannelKind;
use meg_detective_core::{io, ArtifactPaths, PipelineConfig};
use meg_detective_signal::{band_pass, compute_covariance, epoch_around_events, find_events};

use crate::StageError;

/// Run the sensor-level stage.
pub fn run(paths: &ArtifactPaths, config: &PipelineConfig) -> Result<(), StageError> {
    // Read in the continuous raw data and keep only the channels we need.
    let raw = io::load_raw(&paths.raw)?;
    let raw = raw.pick_by_kind(&[ChannelKind::Grad, ChannelKind::Stim])?;

    // Bandpass filter the data.
    let raw = band_pass(&raw, config.l_freq, config.h_freq, config.filter_order)?;

    // The experiment interleaves left and right auditory beeps; those two
    // conditions are the ones we epoch around.
    let events = find_events(&raw)?;
    let epochs = epoch_around_events(
        &raw,
        &events,
        &config.condition_codes(),
        config.tmin,
        config.tmax,
        config.decim,
    )?;

    // Per-condition averages.
    let evoked_left = epochs.average(Some(config.code_left), "left_aud")?;
    let evoked_right = epochs.average(Some(config.code_right), "right_aud")?;

    // Data covariance for the beamformer.
    let data_cov = compute_covariance(&epochs, config.cov_tmin, config.cov_tmax)?;

    io::save_events(&paths.events, &events, raw.info.sfreq)?;
    io::save_epochs(&paths.epochs, &epochs)?;
    io::save_evoked_pair(&paths.evoked, &evoked_left, &evoked_right)?;
    io::save_covariance(&paths.covariance, &data_cov)?;

    info!(
        "sensor level done: {} events, {} epochs, covariance over {} samples",
        events.len(),
        epochs.n_epochs(),
        data_cov.n_samples
    );
    Ok(())
}
