//! Stage 3 — ROI determination.
//!
//! Crops the source estimate to the primary-response window, finds the
//! peak-activity vertex in each hemisphere, and grows a fixed-extent label
//! around each peak along the cortical surface.

use tracing::info;

use meg_detective_core::types::Hemisphere;
use meg_detective_core::{io, ArtifactPaths, PipelineConfig};
use meg_detective_source::{find_peak_vertex, grow_label};

use crate::StageError;

/// Run the ROI-determination stage.
pub fn run(paths: &ArtifactPaths, config: &PipelineConfig) -> Result<(), StageError> {
    let fwd = io::load_forward(&paths.forward)?;
    // Carried along for inspection next to the other inputs; the ROI logic
    // itself only needs the source estimate and the surface geometry.
    let _data_cov = io::load_covariance(&paths.covariance)?;
    let stc = io::load_stc(&paths.stc)?;

    // Focus on the primary auditory response.
    let stc = stc.crop(config.roi_tmin, config.roi_tmax);

    let peak_lh = find_peak_vertex(&stc, Hemisphere::Left)?;
    let peak_rh = find_peak_vertex(&stc, Hemisphere::Right)?;

    let roi_lh = grow_label(&fwd, Hemisphere::Left, peak_lh, config.roi_extent, "roi-lh")?;
    let roi_rh = grow_label(&fwd, Hemisphere::Right, peak_rh, config.roi_extent, "roi-rh")?;

    io::save_label(&paths.roi_lh, &roi_lh)?;
    io::save_label(&paths.roi_rh, &roi_rh)?;

    info!(
        "ROIs done: lh peak {} ({} vertices), rh peak {} ({} vertices)",
        peak_lh,
        roi_lh.len(),
        peak_rh,
        roi_rh.len()
    );
    Ok(())
}
