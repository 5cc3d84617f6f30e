//! Stage 4 — time-resolved decoding.
//!
//! Per-ROI beamformers reconstruct every epoch's source timecourses; the
//! concatenated, normalized timecourses feed a sliding-window logistic
//! regression scored by cross-validated ROC-AUC. The only output is the
//! performance-over-time figure.

use tracing::info;

use meg_detective_core::{io, ArtifactPaths, PipelineConfig};
use meg_detective_decode::{assemble_features, cross_val_scores, plot_performance, SlidingDecoder};
use meg_detective_source::{apply_lcmv_epochs, make_lcmv};

use crate::StageError;

/// Run the time-resolved decoding stage.
pub fn run(paths: &ArtifactPaths, config: &PipelineConfig) -> Result<(), StageError> {
    let epochs = io::load_epochs(&paths.epochs)?;
    let fwd = io::load_forward(&paths.forward)?;
    let data_cov = io::load_covariance(&paths.covariance)?;
    let roi_lh = io::load_label(&paths.roi_lh)?;
    let roi_rh = io::load_label(&paths.roi_rh)?;

    // One beamformer per ROI, applied to every epoch.
    let lcmv_lh = make_lcmv(&epochs.info, &fwd, &data_cov, config.reg, Some(&roi_lh))?;
    let lcmv_rh = make_lcmv(&epochs.info, &fwd, &data_cov, config.reg, Some(&roi_rh))?;
    let stc_lh = apply_lcmv_epochs(&epochs, &lcmv_lh)?;
    let stc_rh = apply_lcmv_epochs(&epochs, &lcmv_rh)?;

    // X and y for decoding.
    let features = assemble_features(&stc_lh, &stc_rh, &epochs)?;

    // Decode along time.
    let decoder = SlidingDecoder {
        c: config.logreg_c,
        max_iter: config.logreg_max_iter,
        tol: config.logreg_tol,
        n_folds: config.n_folds,
    };
    let mean_scores = cross_val_scores(&features.x, &features.y, &decoder)?;

    plot_performance(
        &paths.results,
        &features.times,
        &mean_scores,
        "Decoding left vs. right auditory beeps",
    )?;

    let best = mean_scores.iter().cloned().fold(f64::MIN, f64::max);
    info!(
        "decoding done: peak mean ROC-AUC {:.3}, figure at {}",
        best,
        paths.results.display()
    );
    Ok(())
}
